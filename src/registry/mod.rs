pub mod local;
pub mod onchain;
