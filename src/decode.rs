//! Event decoding.
//!
//! Every topic of a log is looked up in the [`Registry`] together with the
//! log's contract address. Topics without a match are skipped silently, so
//! events added to the contracts later on do not break decoding. A match is
//! decoded strictly against the schema event, indexed inputs coming from the
//! topics following the signature and the rest from the payload. The payload
//! must be the canonical encoding of the decoded values: trailing words and
//! dirty padding are rejected.

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, I256, U256},
};

use crate::{
    error::{DecodeFailure, EventDecodeError},
    registry::{EventDescriptor, FieldKind, Registry},
    types::{Category, LogContext, LogRecord},
};

/// Decoded value of an event field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
    FixedBytes(B256),
    Bytes(Bytes),
    String(String),
    Composite(DynSolValue),
}

/// Decoded event fields in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedFields(Vec<(String, FieldValue)>);

/// Log decoded against the schema event it matched.
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    name: String,
    category: Category,
    topic: B256,
    context: LogContext,
    fields: DecodedFields,
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Address(_) => FieldKind::Address,
            FieldValue::Uint(_) => FieldKind::Uint,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::FixedBytes(_) => FieldKind::FixedBytes,
            FieldValue::Bytes(_) => FieldKind::Bytes,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Composite(_) => FieldKind::Composite,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            FieldValue::Address(address) => Some(*address),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            FieldValue::Uint(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<DynSolValue> for FieldValue {
    fn from(value: DynSolValue) -> Self {
        match value {
            DynSolValue::Address(address) => Self::Address(address),
            DynSolValue::Uint(value, _) => Self::Uint(value),
            DynSolValue::Int(value, _) => Self::Int(value),
            DynSolValue::Bool(value) => Self::Bool(value),
            DynSolValue::FixedBytes(word, _) => Self::FixedBytes(word),
            DynSolValue::Bytes(bytes) => Self::Bytes(bytes.into()),
            DynSolValue::String(value) => Self::String(value),
            other => Self::Composite(other),
        }
    }
}

impl DecodedFields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0
            .iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for DecodedFields {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl DecodedEvent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Signature topic the event was matched by.
    pub fn topic(&self) -> B256 {
        self.topic
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn fields(&self) -> &DecodedFields {
        &self.fields
    }
}

/// Decodes every topic of the log that matches a schema event of the log's
/// contract, in topic order.
pub fn decode<'a>(
    log: &'a LogRecord,
    registry: &'a Registry,
) -> impl Iterator<Item = Result<DecodedEvent, EventDecodeError>> + 'a {
    (0..log.topics().len()).filter_map(move |index| decode_topic(log, index, registry).transpose())
}

/// Decodes the log against the schema event matching its `index`-th topic.
///
/// Returns `Ok(None)` when the topic is not a known signature of the log's
/// contract.
pub fn decode_topic(
    log: &LogRecord,
    index: usize,
    registry: &Registry,
) -> Result<Option<DecodedEvent>, EventDecodeError> {
    let Some(topic) = log.topics().get(index) else {
        return Ok(None);
    };
    let Some(descriptor) = registry.lookup(topic, &log.address()) else {
        return Ok(None);
    };

    let fail = |reason: DecodeFailure| EventDecodeError {
        event: descriptor.name().to_string(),
        category: descriptor.category(),
        topic: *topic,
        context: *log.context(),
        reason,
    };

    let decoded = descriptor
        .decoder()
        .decode_log_parts(log.topics()[index..].iter().copied(), log.data())
        .map_err(|e| fail(e.into()))?;
    check_canonical(&decoded.body, log.data()).map_err(fail)?;
    let fields = typed_fields(descriptor, decoded.indexed, decoded.body).map_err(fail)?;

    Ok(Some(DecodedEvent {
        name: descriptor.name().to_string(),
        category: descriptor.category(),
        topic: *topic,
        context: *log.context(),
        fields,
    }))
}

/// Checks the payload is exactly the encoding of the decoded body values.
fn check_canonical(body: &[DynSolValue], data: &[u8]) -> Result<(), DecodeFailure> {
    let canonical = DynSolValue::Tuple(body.to_vec()).abi_encode_params();
    if canonical != data {
        return Err(DecodeFailure::NonCanonical {
            expected: canonical.len(),
            found: data.len(),
        });
    }
    Ok(())
}

/// Restores declaration order of the decoded values and checks them against
/// the declared field kinds.
fn typed_fields(
    descriptor: &EventDescriptor,
    indexed: Vec<DynSolValue>,
    body: Vec<DynSolValue>,
) -> Result<DecodedFields, DecodeFailure> {
    let found = indexed.len() + body.len();
    if found != descriptor.fields().len() {
        return Err(DecodeFailure::FieldCount {
            expected: descriptor.fields().len(),
            found,
        });
    }

    let (mut indexed, mut body) = (indexed.into_iter(), body.into_iter());
    let mut fields = Vec::with_capacity(found);
    for field in descriptor.fields() {
        let value = if field.indexed {
            indexed.next()
        } else {
            body.next()
        };
        let Some(value) = value.map(FieldValue::from) else {
            return Err(DecodeFailure::FieldCount {
                expected: descriptor.fields().len(),
                found: fields.len(),
            });
        };
        // Indexed dynamic values only leave their hash in the topic
        let hashed = field.indexed
            && matches!(
                field.kind,
                FieldKind::Bytes | FieldKind::String | FieldKind::Composite
            )
            && value.kind() == FieldKind::FixedBytes;
        if value.kind() != field.kind && !hashed {
            return Err(DecodeFailure::FieldType {
                field: field.name.clone(),
                expected: field.kind,
                found: value.kind(),
            });
        }
        fields.push((field.name.clone(), value));
    }
    Ok(DecodedFields(fields))
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{Bytes, U256, address, b256},
        sol_types::SolEvent,
    };

    use super::*;
    use crate::{error::DecodeFailure, registry, testing};

    #[test]
    fn test_decode_created() {
        let registry = testing::registry();
        let log = testing::created_log(Category::FF, 7, 100, 50);

        let events = decode(&log, &registry).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.name(), "EscrowCreated");
        assert_eq!(event.category(), Category::FF);
        assert_eq!(
            event.topic(),
            testing::escrow::fungible_fungible::EscrowCreated::SIGNATURE_HASH
        );
        assert_eq!(event.context().address, testing::FF);

        let names = event.fields().iter().map(|(n, _)| n).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "escrowIndex",
                "xOwner",
                "xTokenContractAddr",
                "xAmount",
                "yOwner",
                "yTokenContractAddr",
                "yAmount"
            ]
        );
        assert_eq!(
            event.fields().get("escrowIndex"),
            Some(&FieldValue::Uint(U256::from(7)))
        );
        assert_eq!(
            event.fields().get("yTokenContractAddr"),
            Some(&FieldValue::Address(testing::Y_ASSET))
        );
    }

    #[test]
    fn test_unknown_topic_or_contract_is_skipped() {
        let registry = testing::registry();

        let mut log = testing::created_log(Category::NF, 1, 1, 1);
        log.topics[0] = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
        assert_eq!(decode(&log, &registry).count(), 0);

        let log = LogRecord::new(
            address!("0x00000000000000000000000000000000000000ee"),
            testing::created_log(Category::NF, 1, 1, 1).topics,
            Bytes::new(),
        );
        assert_eq!(decode(&log, &registry).count(), 0);

        let log = LogRecord::new(testing::NF, vec![], Bytes::new());
        assert_eq!(decode(&log, &registry).count(), 0);
    }

    #[test]
    fn test_truncated_payload() {
        let registry = testing::registry();
        let mut log = testing::created_log(Category::FN, 4, 10, 2);
        log.data = Bytes::copy_from_slice(&log.data[..64]);

        let err = decode(&log, &registry).next().unwrap().unwrap_err();
        assert_eq!(err.event, "EscrowCreated");
        assert_eq!(err.category, Category::FN);
        assert_eq!(err.context.address, testing::FN);
        assert!(matches!(err.reason, DecodeFailure::Abi(_)));
    }

    #[test]
    fn test_trailing_payload_word() {
        let registry = testing::registry();
        let mut log = testing::created_log(Category::FF, 7, 100, 50);
        let mut data = log.data.to_vec();
        data.extend([0xff; 32]);
        log.data = data.into();

        let err = decode(&log, &registry).next().unwrap().unwrap_err();
        assert_eq!(err.event, "EscrowCreated");
        assert!(matches!(
            err.reason,
            DecodeFailure::NonCanonical {
                expected: 224,
                found: 256
            }
        ));
    }

    #[test]
    fn test_dirty_address_padding() {
        let registry = testing::registry();
        let mut log = testing::created_log(Category::FF, 7, 100, 50);
        let mut data = log.data.to_vec();
        // High byte of the xOwner word
        data[32] = 0xff;
        log.data = data.into();

        let err = decode(&log, &registry).next().unwrap().unwrap_err();
        assert_eq!(err.context.address, testing::FF);
        assert!(matches!(err.reason, DecodeFailure::NonCanonical { .. }));
    }

    #[test]
    fn test_empty_payload_without_data_fields() {
        let registry = testing::registry_with(
            Category::NN,
            registry::EventSchema::parse(["event EscrowRejected()"]).unwrap(),
        );
        let selector = registry
            .events(Category::NN)
            .find(|e| e.name() == "EscrowRejected")
            .unwrap()
            .selector();
        let log = LogRecord::new(testing::NN, vec![selector], Bytes::new());

        let event = decode(&log, &registry).next().unwrap().unwrap();
        assert_eq!(event.name(), "EscrowRejected");
        assert!(event.fields().is_empty());
    }

    #[test]
    fn test_indexed_fields_keep_declaration_order() {
        let registry = testing::registry_with(
            Category::FF,
            registry::EventSchema::parse([
                "event EscrowAccepted(uint256 indexed escrowIndex, address yOwner)",
            ])
            .unwrap(),
        );
        let accepted = testing::escrow::indexed::EscrowAccepted {
            escrowIndex: U256::from(12),
            yOwner: testing::Y_OWNER,
        };
        let log = LogRecord::from_log_data(testing::FF, accepted.encode_log_data());

        let events = decode(&log, &registry).collect::<Result<Vec<_>, _>>().unwrap();
        // The escrow index topic is no known signature
        assert_eq!(events.len(), 1);
        let fields = events[0].fields().iter().collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec![
                ("escrowIndex", &FieldValue::Uint(U256::from(12))),
                ("yOwner", &FieldValue::Address(testing::Y_OWNER)),
            ]
        );

        // Missing the indexed value topic
        let log = LogRecord::new(testing::FF, vec![log.topics[0]], log.data.clone());
        assert!(decode(&log, &registry).next().unwrap().is_err());
    }
}
