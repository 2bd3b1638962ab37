// charta-common: shared types and wire formats for the Charta gateway

pub mod keygen;
pub mod link;
pub mod protocol;
pub mod types;
