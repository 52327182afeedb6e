pub mod bus;
pub mod channel;
pub mod config;
pub mod dma;
mod hdma;
pub mod machine;
pub mod script;
pub mod sdd1;
pub mod timing;

#[cfg(test)]
mod testing;
