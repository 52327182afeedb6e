use std::env;
use std::fs;

use snes_dma::machine::Machine;
use snes_dma::script::Script;

fn main_(path: &str) -> Result<(), String> {
    env_logger::init();

    let src = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let script = Script::parse(&src)?;

    let mut machine = Machine::default();
    machine.power_on();
    for line in script.run(&mut machine)? {
        println!("{}", line);
    }

    Ok(())
}

fn main() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).ok_or("usage: dma-script <script>")?;
    main_(path)
}
