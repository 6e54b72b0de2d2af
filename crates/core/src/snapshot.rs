use firmware::fuses::FuseConfig;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub clock_hz: u32,
    pub cycles: u64,
    pub iterations: u64,
    pub config_word: u16,
    pub fuses: FuseConfig,
    pub port: PortSnapshot,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortSnapshot {
    pub data_address: u16,
    pub tris_address: u16,
    pub latch: u8,
    pub tris: u8,
    pub pins: u8,
    pub tris_writes: u64,
    pub data_writes: u64,
}
