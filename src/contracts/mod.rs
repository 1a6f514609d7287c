// Contracts Module - Contract interface schemas (events only, no calls are issued)

pub mod lot_game;

pub use lot_game::ContractSchema;
