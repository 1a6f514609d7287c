//! # LotGame Contract Schema
//!
//! The published interface of the LotGame contract (`abi/LotGame.json`), embedded at
//! compile time. Only the event entries are used: they declare, per event, the ordered
//! field list (name, primitive type, indexed-or-not) that payload decoding follows, and
//! the event signature whose keccak hash is the log's primary topic.

use crate::error::SchemaError;
use crate::event_classifier::EventKind;
use ethers::abi::{Abi, Event, ParamType};
use ethers::types::H256;

/// Static, versioned contract interface document
pub const LOT_GAME_ABI: &str = include_str!("../../abi/LotGame.json");

/// Event layouts of the contract interface schema
#[derive(Debug, Clone)]
pub struct ContractSchema {
    abi: Abi,
}

impl ContractSchema {
    /// Load the embedded LotGame schema
    pub fn lot_game() -> Result<Self, SchemaError> {
        Self::from_json(LOT_GAME_ABI)
    }

    /// Parse a JSON ABI and check that every known event kind is declared
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let abi: Abi = serde_json::from_str(json)?;
        let schema = Self { abi };
        for kind in EventKind::ALL {
            schema.event(kind)?;
        }
        Ok(schema)
    }

    /// The schema entry for an event kind
    pub fn event(&self, kind: EventKind) -> Result<&Event, SchemaError> {
        self.abi
            .event(kind.event_name())
            .map_err(|_| SchemaError::MissingEvent(kind.event_name()))
    }

    /// keccak256 of the canonical event signature, i.e. the expected `topics[0]`
    pub fn topic(&self, kind: EventKind) -> Result<H256, SchemaError> {
        Ok(self.event(kind)?.signature())
    }

    /// Ordered types of the non-indexed fields, which make up the log payload
    pub fn payload_types(&self, kind: EventKind) -> Result<Vec<ParamType>, SchemaError> {
        Ok(self
            .event(kind)?
            .inputs
            .iter()
            .filter(|input| !input.indexed)
            .map(|input| input.kind.clone())
            .collect())
    }

    /// Ordered names of the non-indexed fields
    pub fn payload_field_names(&self, kind: EventKind) -> Result<Vec<String>, SchemaError> {
        Ok(self
            .event(kind)?
            .inputs
            .iter()
            .filter(|input| !input.indexed)
            .map(|input| input.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_schema_declares_all_kinds() {
        let schema = ContractSchema::lot_game().unwrap();
        for kind in EventKind::ALL {
            assert_eq!(schema.event(kind).unwrap().name, kind.event_name());
        }
    }

    #[test]
    fn test_lot_created_layout() {
        let schema = ContractSchema::lot_game().unwrap();
        let names = schema.payload_field_names(EventKind::LotCreated).unwrap();
        assert_eq!(
            names,
            vec![
                "lotId",
                "tokenA",
                "tokenBChoices",
                "startEpoch",
                "duration",
                "creator",
                "isPrivate",
                "isChallenge"
            ]
        );
        let types = schema.payload_types(EventKind::LotCreated).unwrap();
        assert_eq!(types[2], ParamType::Array(Box::new(ParamType::String)));
        assert_eq!(types[5], ParamType::Address);
    }

    #[test]
    fn test_schema_without_event_rejected() {
        let json = r#"[{"anonymous":false,"inputs":[],"name":"Initialized","type":"event"}]"#;
        assert!(matches!(
            ContractSchema::from_json(json),
            Err(SchemaError::MissingEvent("LotCreated"))
        ));
    }

    #[test]
    fn test_malformed_schema_rejected() {
        assert!(matches!(
            ContractSchema::from_json("not json"),
            Err(SchemaError::Malformed(_))
        ));
    }
}
