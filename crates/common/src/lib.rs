// worksync-common: wire protocol and domain types shared by the worksync crates

pub mod language;
pub mod protocol;
pub mod types;
