//! # Event Decoder
//!
//! Turns a classified log payload into a typed record following the field layout the
//! contract schema declares for that event kind.
//!
//! ## Strictness
//!
//! A payload is accepted only if it is exactly the canonical ABI encoding of the values
//! decoded from it. Truncated payloads, trailing bytes, dirty address padding and
//! non-0/1 booleans all fail with [`DecodeError`], never with a panic.
//!
//! ## Amounts
//!
//! `uint256` fields stay [`U256`] end to end and are written to `NUMERIC(78,0)` columns
//! from their decimal text. Nothing is narrowed to a machine integer or a float.

use crate::contracts::ContractSchema;
use crate::error::{DecodeError, SchemaError};
use crate::event_classifier::EventKind;
use crate::types::RawLog;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, H256, U256};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Namespace for name-based record ids derived from event identity
pub const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5b2c_1f0e_8d4a_4c6b_9e73_a1d0_42f8_c915);

const WORD: usize = 32;

/// How the storage key of a record is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// UUIDv5 of `(transaction hash, log index)`: re-delivery converges to one row
    #[default]
    EventIdentity,
    /// Fresh UUIDv4 per decode: every delivery becomes a new row
    Random,
}

impl KeyScheme {
    pub fn record_id(&self, raw: &RawLog) -> Uuid {
        match self {
            KeyScheme::EventIdentity => {
                Uuid::new_v5(&RECORD_ID_NAMESPACE, raw.event_identity().as_bytes())
            }
            KeyScheme::Random => Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotCreated {
    pub lot_id: U256,
    pub token_a: String,
    pub token_b_choices: Vec<String>,
    pub start_epoch: U256,
    pub duration: U256,
    pub creator: Address,
    pub is_private: bool,
    pub is_challenge: bool,
}

impl LotCreated {
    pub const FIELD_COUNT: usize = 8;

    /// Candidate quote assets as stored: a JSON array, e.g. `["USDC","DAI"]`
    pub fn token_b_choices_text(&self) -> String {
        serde_json::Value::from(self.token_b_choices.clone()).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotJoined {
    pub lot_id: U256,
    pub token: String,
    pub user: Address,
    pub size: U256,
}

impl LotJoined {
    pub const FIELD_COUNT: usize = 4;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotResolved {
    pub lot_id: U256,
    pub size: U256,
    pub winning_token: String,
    pub start_price_token_a: U256,
    pub start_price_token_b: U256,
    pub resolve_price_token_a: U256,
    pub resolve_price_token_b: U256,
}

impl LotResolved {
    pub const FIELD_COUNT: usize = 7;
}

/// Typed payload, one variant per [`EventKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotEvent {
    Created(LotCreated),
    Joined(LotJoined),
    Resolved(LotResolved),
}

impl LotEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LotEvent::Created(_) => EventKind::LotCreated,
            LotEvent::Joined(_) => EventKind::LotJoined,
            LotEvent::Resolved(_) => EventKind::LotResolved,
        }
    }

    pub fn field_count(&self) -> usize {
        expected_field_count(self.kind())
    }
}

fn expected_field_count(kind: EventKind) -> usize {
    match kind {
        EventKind::LotCreated => LotCreated::FIELD_COUNT,
        EventKind::LotJoined => LotJoined::FIELD_COUNT,
        EventKind::LotResolved => LotResolved::FIELD_COUNT,
    }
}

/// Storage key and chain provenance of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMeta {
    pub id: Uuid,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

/// A decoded log, ready for the persistence gateway. Never mutated after decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub meta: EventMeta,
    pub event: LotEvent,
}

impl DecodedRecord {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

#[derive(Debug, Clone)]
struct PayloadLayout {
    names: Vec<String>,
    types: Vec<ParamType>,
}

/// Schema-driven decoder for the known event kinds
#[derive(Debug, Clone)]
pub struct EventDecoder {
    layouts: HashMap<EventKind, PayloadLayout>,
    key_scheme: KeyScheme,
}

impl EventDecoder {
    pub fn new(schema: &ContractSchema, key_scheme: KeyScheme) -> Result<Self, SchemaError> {
        let mut layouts = HashMap::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            layouts.insert(
                kind,
                PayloadLayout {
                    names: schema.payload_field_names(kind)?,
                    types: schema.payload_types(kind)?,
                },
            );
        }
        Ok(Self {
            layouts,
            key_scheme,
        })
    }

    pub fn key_scheme(&self) -> KeyScheme {
        self.key_scheme
    }

    /// Decode a classified log into a record carrying its storage key and provenance
    pub fn decode(&self, kind: EventKind, raw: &RawLog) -> Result<DecodedRecord, DecodeError> {
        let event = self.decode_payload(kind, raw.data.as_ref())?;
        let meta = EventMeta {
            id: self.key_scheme.record_id(raw),
            block_number: raw.block_number,
            transaction_hash: raw.transaction_hash,
            log_index: raw.log_index,
        };
        debug!(
            "🧩 [Decoder] {} at block {} decoded as record {}",
            kind, raw.block_number, meta.id
        );
        Ok(DecodedRecord { meta, event })
    }

    /// Pure function of `(kind, payload)` for a fixed schema
    pub fn decode_payload(&self, kind: EventKind, payload: &[u8]) -> Result<LotEvent, DecodeError> {
        let layout = self
            .layouts
            .get(&kind)
            .ok_or(DecodeError::FieldCount {
                kind,
                expected: expected_field_count(kind),
                actual: 0,
            })?;

        let expected = expected_field_count(kind);
        if layout.types.len() != expected {
            return Err(DecodeError::FieldCount {
                kind,
                expected,
                actual: layout.types.len(),
            });
        }

        // Every head slot is one word; anything shorter or unaligned cannot be canonical
        if payload.len() % WORD != 0 || payload.len() < WORD * layout.types.len() {
            return Err(DecodeError::PayloadLength {
                kind,
                len: payload.len(),
            });
        }

        let tokens = abi::decode(&layout.types, payload)
            .map_err(|source| DecodeError::Abi { kind, source })?;
        check_canonical(kind, layout, &tokens, payload)?;

        let mut fields = FieldReader::new(kind, &layout.names, tokens);
        let event = match kind {
            EventKind::LotCreated => LotEvent::Created(LotCreated {
                lot_id: fields.uint()?,
                token_a: fields.string()?,
                token_b_choices: fields.string_array()?,
                start_epoch: fields.uint()?,
                duration: fields.uint()?,
                creator: fields.address()?,
                is_private: fields.boolean()?,
                is_challenge: fields.boolean()?,
            }),
            EventKind::LotJoined => LotEvent::Joined(LotJoined {
                lot_id: fields.uint()?,
                token: fields.string()?,
                user: fields.address()?,
                size: fields.uint()?,
            }),
            EventKind::LotResolved => LotEvent::Resolved(LotResolved {
                lot_id: fields.uint()?,
                size: fields.uint()?,
                winning_token: fields.string()?,
                start_price_token_a: fields.uint()?,
                start_price_token_b: fields.uint()?,
                resolve_price_token_a: fields.uint()?,
                resolve_price_token_b: fields.uint()?,
            }),
        };
        Ok(event)
    }
}

/// Re-encode the decoded tokens and require a byte-exact match with the payload.
/// A mismatch inside the head is attributed to the field owning that word.
fn check_canonical(
    kind: EventKind,
    layout: &PayloadLayout,
    tokens: &[Token],
    payload: &[u8],
) -> Result<(), DecodeError> {
    let encoded = abi::encode(tokens);
    if encoded.len() != payload.len() {
        return Err(DecodeError::PayloadLength {
            kind,
            len: payload.len(),
        });
    }
    let Some(offset) = encoded.iter().zip(payload).position(|(a, b)| a != b) else {
        return Ok(());
    };
    let slot = offset / WORD;
    match (layout.names.get(slot), layout.types.get(slot)) {
        (Some(name), Some(param)) => Err(DecodeError::FieldType {
            kind,
            field: name.clone(),
            expected: param.to_string(),
        }),
        _ => Err(DecodeError::NonCanonical { kind, offset }),
    }
}

/// Walks decoded tokens in schema order, coercing each to its declared Rust type
struct FieldReader<'a> {
    kind: EventKind,
    names: &'a [String],
    tokens: std::vec::IntoIter<Token>,
    position: usize,
}

impl<'a> FieldReader<'a> {
    fn new(kind: EventKind, names: &'a [String], tokens: Vec<Token>) -> Self {
        Self {
            kind,
            names,
            tokens: tokens.into_iter(),
            position: 0,
        }
    }

    fn next(&mut self) -> Result<(String, Token), DecodeError> {
        let name = self
            .names
            .get(self.position)
            .cloned()
            .unwrap_or_else(|| format!("#{}", self.position));
        self.position += 1;
        match self.tokens.next() {
            Some(token) => Ok((name, token)),
            None => Err(DecodeError::FieldCount {
                kind: self.kind,
                expected: expected_field_count(self.kind),
                actual: self.position - 1,
            }),
        }
    }

    fn mismatch(&self, field: String, expected: &str) -> DecodeError {
        DecodeError::FieldType {
            kind: self.kind,
            field,
            expected: expected.to_string(),
        }
    }

    fn uint(&mut self) -> Result<U256, DecodeError> {
        match self.next()? {
            (_, Token::Uint(value)) => Ok(value),
            (field, _) => Err(self.mismatch(field, "uint256")),
        }
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        match self.next()? {
            (_, Token::String(value)) => Ok(value),
            (field, _) => Err(self.mismatch(field, "string")),
        }
    }

    fn string_array(&mut self) -> Result<Vec<String>, DecodeError> {
        let (field, token) = self.next()?;
        let Token::Array(items) = token else {
            return Err(self.mismatch(field, "string[]"));
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Token::String(value) => values.push(value),
                _ => return Err(self.mismatch(field, "string[]")),
            }
        }
        Ok(values)
    }

    fn address(&mut self) -> Result<Address, DecodeError> {
        match self.next()? {
            (_, Token::Address(value)) => Ok(value),
            (field, _) => Err(self.mismatch(field, "address")),
        }
    }

    fn boolean(&mut self) -> Result<bool, DecodeError> {
        match self.next()? {
            (_, Token::Bool(value)) => Ok(value),
            (field, _) => Err(self.mismatch(field, "bool")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn decoder() -> EventDecoder {
        EventDecoder::new(&ContractSchema::lot_game().unwrap(), KeyScheme::EventIdentity)
            .unwrap()
    }

    fn creator() -> Address {
        Address::from_str("0xabc0000000000000000000000000000000000123").unwrap()
    }

    fn lot_created_payload(choices: &[&str]) -> Vec<u8> {
        abi::encode(&[
            Token::Uint(U256::from(7)),
            Token::String("ETH".to_string()),
            Token::Array(
                choices
                    .iter()
                    .map(|c| Token::String(c.to_string()))
                    .collect(),
            ),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::from(3600)),
            Token::Address(creator()),
            Token::Bool(false),
            Token::Bool(true),
        ])
    }

    fn lot_joined_payload() -> Vec<u8> {
        abi::encode(&[
            Token::Uint(U256::from(7)),
            Token::String("USDC".to_string()),
            Token::Address(creator()),
            Token::Uint(U256::MAX),
        ])
    }

    fn lot_resolved_payload() -> Vec<u8> {
        abi::encode(&[
            Token::Uint(U256::from(7)),
            Token::Uint(U256::from(2)),
            Token::String("DAI".to_string()),
            Token::Uint(U256::from_dec_str("2000000000000000000000").unwrap()),
            Token::Uint(U256::from_dec_str("1000000000000000000").unwrap()),
            Token::Uint(U256::from_dec_str("2100000000000000000000").unwrap()),
            Token::Uint(U256::from_dec_str("999000000000000000").unwrap()),
        ])
    }

    fn raw_log(data: Vec<u8>, log_index: u64) -> RawLog {
        RawLog {
            address: Address::zero(),
            topics: vec![],
            data: data.into(),
            block_number: 500,
            transaction_hash: H256::from_low_u64_be(0xfeed),
            log_index,
        }
    }

    #[test]
    fn test_decode_lot_created() {
        let event = decoder()
            .decode_payload(EventKind::LotCreated, &lot_created_payload(&["USDC", "DAI"]))
            .unwrap();
        let LotEvent::Created(created) = &event else {
            panic!("expected LotCreated, got {:?}", event);
        };
        assert_eq!(created.lot_id, U256::from(7));
        assert_eq!(created.token_a, "ETH");
        assert_eq!(created.token_b_choices, vec!["USDC", "DAI"]);
        assert_eq!(created.start_epoch, U256::from(1_700_000_000u64));
        assert_eq!(created.duration, U256::from(3600));
        assert_eq!(created.creator, creator());
        assert!(!created.is_private);
        assert!(created.is_challenge);
        assert_eq!(created.token_b_choices_text(), r#"["USDC","DAI"]"#);
        assert_eq!(event.field_count(), 8);
    }

    #[test]
    fn test_decode_long_choice_list_is_not_truncated() {
        let choices: Vec<String> = (0..40).map(|i| format!("TOKEN{}", i)).collect();
        let refs: Vec<&str> = choices.iter().map(String::as_str).collect();
        let event = decoder()
            .decode_payload(EventKind::LotCreated, &lot_created_payload(&refs))
            .unwrap();
        let LotEvent::Created(created) = event else {
            panic!("expected LotCreated");
        };
        assert_eq!(created.token_b_choices, choices);
    }

    #[test]
    fn test_decode_lot_joined_keeps_full_width_amounts() {
        let event = decoder()
            .decode_payload(EventKind::LotJoined, &lot_joined_payload())
            .unwrap();
        let LotEvent::Joined(joined) = event else {
            panic!("expected LotJoined");
        };
        assert_eq!(joined.size, U256::MAX);
        assert_eq!(joined.user, creator());
        assert_eq!(joined.token, "USDC");
    }

    #[test]
    fn test_decode_lot_resolved() {
        let event = decoder()
            .decode_payload(EventKind::LotResolved, &lot_resolved_payload())
            .unwrap();
        assert_eq!(event.kind(), EventKind::LotResolved);
        assert_eq!(event.field_count(), 7);
        let LotEvent::Resolved(resolved) = event else {
            panic!("expected LotResolved");
        };
        assert_eq!(resolved.winning_token, "DAI");
        assert_eq!(
            resolved.resolve_price_token_a.to_string(),
            "2100000000000000000000"
        );
    }

    #[test]
    fn test_truncated_payload_is_decode_error() {
        let mut payload = lot_resolved_payload();
        payload.pop();
        let err = decoder()
            .decode_payload(EventKind::LotResolved, &payload)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::PayloadLength {
                kind: EventKind::LotResolved,
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_length_payloads_only_fail_with_decode_error() {
        let decoder = decoder();
        let payload = lot_created_payload(&["USDC"]);
        for len in [0, 31, 32, 64, 255, 256, payload.len() - 32, payload.len() - 1] {
            let result = decoder.decode_payload(EventKind::LotCreated, &payload[..len]);
            assert!(result.is_err(), "length {} should not decode", len);
        }
        let mut padded = payload.clone();
        padded.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            decoder.decode_payload(EventKind::LotCreated, &padded),
            Err(DecodeError::PayloadLength { .. })
        ));
    }

    #[test]
    fn test_dirty_address_word_is_field_type_error() {
        let mut payload = lot_joined_payload();
        // third head slot holds `user`; a non-zero high byte is not a 20-byte address
        payload[2 * 32] = 0xff;
        let err = decoder()
            .decode_payload(EventKind::LotJoined, &payload)
            .unwrap_err();
        match err {
            DecodeError::FieldType { field, expected, .. } => {
                assert_eq!(field, "user");
                assert_eq!(expected, "address");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_payload_of_other_kind_is_rejected() {
        // LotJoined bytes laid out against the LotResolved schema
        let result = decoder().decode_payload(EventKind::LotResolved, &lot_joined_payload());
        assert!(result.is_err());
    }

    #[test]
    fn test_event_identity_key_is_stable() {
        let decoder = decoder();
        let a = decoder
            .decode(EventKind::LotJoined, &raw_log(lot_joined_payload(), 4))
            .unwrap();
        let b = decoder
            .decode(EventKind::LotJoined, &raw_log(lot_joined_payload(), 4))
            .unwrap();
        let c = decoder
            .decode(EventKind::LotJoined, &raw_log(lot_joined_payload(), 5))
            .unwrap();
        assert_eq!(a.meta.id, b.meta.id);
        assert_ne!(a.meta.id, c.meta.id);
        assert_eq!(a.meta.block_number, 500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_key_differs_per_decode() {
        let decoder =
            EventDecoder::new(&ContractSchema::lot_game().unwrap(), KeyScheme::Random).unwrap();
        let raw = raw_log(lot_joined_payload(), 4);
        let a = decoder.decode(EventKind::LotJoined, &raw).unwrap();
        let b = decoder.decode(EventKind::LotJoined, &raw).unwrap();
        assert_ne!(a.meta.id, b.meta.id);
        assert_eq!(a.event, b.event);
    }

    #[test]
    fn test_schema_drift_is_field_count_error() {
        let json = r#"[
            {"anonymous":false,"inputs":[{"indexed":false,"name":"lotId","type":"uint256"}],"name":"LotCreated","type":"event"},
            {"anonymous":false,"inputs":[],"name":"LotJoined","type":"event"},
            {"anonymous":false,"inputs":[],"name":"LotResolved","type":"event"}
        ]"#;
        let schema = ContractSchema::from_json(json).unwrap();
        let decoder = EventDecoder::new(&schema, KeyScheme::EventIdentity).unwrap();
        let err = decoder
            .decode_payload(EventKind::LotCreated, &[0u8; 32])
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::FieldCount {
                expected: 8,
                actual: 1,
                ..
            }
        ));
    }
}
