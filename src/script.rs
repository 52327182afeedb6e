// Line-oriented driver for `Machine`.
//
//   w <addr> <value>        CPU write ($43xx, $420B, $420C, $2181 ...)
//   poke <addr> <bytes...>  store bytes straight into memory
//   dma <mask>              shorthand for `w 420b <mask>`
//   lines <n>               idle for n scanlines
//   frame                   idle until the next frame starts
//   set <key> <value>       change a config entry
//   p <what>                print `ch<n>`, `mem[<addr>]`, `hdma`, `oam`, `flags`, `clock`
//                           or `trace`
//   trace on|off            record B-Bus writes
//
// Numbers are hex (an optional `0x` or `$` prefix is accepted) except the line count. `#` starts
// a comment.

use crate::machine::Machine;
use crate::timing::Clock;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

#[derive(Debug, PartialEq)]
enum Printable {
    Channel(u8),
    Mem(u32),
    Hdma,
    Oam,
    Flags,
    Clock,
    Trace,
}

fn parse_hex(s: &str) -> Option<u32> {
    let s = s.trim_start_matches("0x").trim_start_matches('$');
    u32::from_str_radix(s, 16).ok()
}

fn parse_hex8(s: &str) -> Result<u8, String> {
    match parse_hex(s) {
        Some(v) if v <= 0xFF => Ok(v as u8),
        _ => Err(format!("invalid byte: {}", s)),
    }
}

fn parse_addr(s: &str) -> Result<u32, String> {
    match parse_hex(s) {
        Some(v) if v <= 0xFFFFFF => Ok(v),
        _ => Err(format!("invalid address: {}", s)),
    }
}

impl Printable {
    fn parse(s: &str) -> Result<Self, String> {
        lazy_static! {
            static ref CHANNEL: Regex = Regex::new(r"^ch([0-7])$").unwrap();
            static ref MEM: Regex = Regex::new(r"^mem\[((?:0x|\$)?[0-9a-fA-F]+)\]$").unwrap();
        }
        match s {
            "hdma" => return Ok(Printable::Hdma),
            "oam" => return Ok(Printable::Oam),
            "flags" => return Ok(Printable::Flags),
            "clock" => return Ok(Printable::Clock),
            "trace" => return Ok(Printable::Trace),
            _ => (),
        }
        if let Some(cap) = CHANNEL.captures(s) {
            let ch = cap[1].parse::<u8>().map_err(|e| e.to_string())?;
            return Ok(Printable::Channel(ch));
        }
        if let Some(cap) = MEM.captures(s) {
            return Ok(Printable::Mem(parse_addr(&cap[1])?));
        }
        Err(format!("cannot print {}", s))
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Write(u32, u8),
    Poke(u32, Vec<u8>),
    Lines(u32),
    Frame,
    Set(String, String),
    Print(Printable),
    Trace(bool),
}

impl Command {
    fn parse(s: &str) -> Result<Self, String> {
        lazy_static! {
            static ref SPACES: Regex = Regex::new(r"[ \t]+").unwrap();
        }
        let tokens: Vec<&str> = SPACES.split(s.trim()).collect();
        match tokens[0] {
            "w" if tokens.len() == 3 => Ok(Command::Write(parse_addr(tokens[1])?, parse_hex8(tokens[2])?)),
            "poke" if tokens.len() >= 3 => {
                let addr = parse_addr(tokens[1])?;
                let bytes = tokens[2..].iter().map(|t| parse_hex8(t)).collect::<Result<Vec<_>, _>>()?;
                Ok(Command::Poke(addr, bytes))
            }
            "dma" if tokens.len() == 2 => Ok(Command::Write(0x420B, parse_hex8(tokens[1])?)),
            "lines" if tokens.len() == 2 => {
                let n = tokens[1].parse::<u32>().map_err(|e| e.to_string())?;
                Ok(Command::Lines(n))
            }
            "frame" => Ok(Command::Frame),
            "set" if tokens.len() == 3 => Ok(Command::Set(tokens[1].to_owned(), tokens[2].to_owned())),
            "p" if tokens.len() == 2 => Ok(Command::Print(Printable::parse(tokens[1])?)),
            "trace" if tokens.len() == 2 => match tokens[1] {
                "on" => Ok(Command::Trace(true)),
                "off" => Ok(Command::Trace(false)),
                v => Err(format!("expected on/off, got {}", v)),
            },
            cmd => Err(format!("unknown command: {}", cmd)),
        }
    }
}

pub struct Script {
    commands: Vec<(usize, Command)>,
}

impl Script {
    pub fn parse(src: &str) -> Result<Self, String> {
        let mut commands = Vec::new();
        for (idx, line) in src.lines().enumerate() {
            let line = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line,
            };
            if line.trim().is_empty() {
                continue;
            }
            let cmd = Command::parse(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
            commands.push((idx + 1, cmd));
        }
        Ok(Self { commands })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Runs every command in order and collects what `p` printed.
    pub fn run(&self, machine: &mut Machine) -> Result<Vec<String>, String> {
        let mut out = Vec::new();
        for (line, cmd) in self.commands.iter() {
            match exec(cmd, machine) {
                Ok(Some(s)) => out.push(s),
                Ok(None) => (),
                Err(e) => {
                    warn!("line {}: {}", line, e);
                    return Err(format!("line {}: {}", line, e));
                }
            }
        }
        Ok(out)
    }
}

fn exec(cmd: &Command, m: &mut Machine) -> Result<Option<String>, String> {
    match cmd {
        Command::Write(addr, v) => m.write(*addr, *v),
        Command::Poke(addr, bytes) => m.bus.load(*addr, bytes),
        Command::Lines(n) => m.run_lines(*n),
        Command::Frame => m.run_frame(),
        Command::Set(key, value) => m.dma.config.set(key, value)?,
        Command::Trace(v) => m.bus.set_trace(*v),
        Command::Print(p) => return Ok(Some(print(p, m))),
    }
    Ok(None)
}

fn print(p: &Printable, m: &mut Machine) -> String {
    match p {
        Printable::Channel(ch) => {
            let c = &m.dma.channels[*ch as usize];
            format!(
                "ch{}: params={:#04X} b=$21{:02X} a=${:02X}:{:04X} count={:#06X} ibank=${:02X} table={:#06X} lines={} repeat={} do_transfer={}",
                ch,
                u8::from(c.params),
                c.b_address,
                c.a_bank,
                c.a_address,
                c.count,
                c.indirect_bank,
                c.address,
                c.line_count,
                c.repeat,
                c.do_transfer
            )
        }
        Printable::Mem(addr) => format!("{:#08X}: {:#04X}", addr, m.bus.peek_addr(*addr)),
        Printable::Hdma => format!(
            "hdma: enable={:#04X} active={:#04X} ended={:#04X}",
            m.dma.hdma_enable(),
            m.dma.hdma_active(),
            m.dma.hdma_ended()
        ),
        Printable::Oam => format!("oam: address={:#06X}", m.bus.oam_address()),
        Printable::Flags => format!("{:?}", m.dma.flags()),
        Printable::Clock => format!(
            "frame={} line={} cycles={}",
            m.clock.frame(),
            m.clock.line(),
            m.clock.cycles()
        ),
        Printable::Trace => {
            let writes: Vec<String> = m.bus.take_trace().iter().map(|(a, v)| format!("{:04X}={:02X}", a, v)).collect();
            format!("trace: [{}]", writes.join(", "))
        }
    }
}
