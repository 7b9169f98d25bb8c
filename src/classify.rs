//! Trade classification.
//!
//! Turns decoded escrow events into [`TradeEvent`]s. What is extracted from
//! which field is described by a per-category rule table, the only
//! category-specific part being the name of the amount fields: fungible
//! sides carry `xAmount`/`yAmount`, non-fungible sides `xIndex`/`yIndex`.

use std::collections::HashMap;

use alloy::primitives::Address;
use tracing::debug;

use crate::{
    decode::{DecodedEvent, DecodedFields},
    error::SchemaLoadError,
    registry::{EventDescriptor, FieldKind, Registry},
    types::{AssetKind, Category, EventContext, TradeEvent, TradeStage},
};

pub const ESCROW_CREATED: &str = "EscrowCreated";
pub const ESCROW_ACCEPTED: &str = "EscrowAccepted";
pub const ESCROW_REJECTED: &str = "EscrowRejected";

const ESCROW_INDEX: &str = "escrowIndex";
const X_OWNER: &str = "xOwner";
const Y_OWNER: &str = "yOwner";
const X_TOKEN: &str = "xTokenContractAddr";
const Y_TOKEN: &str = "yTokenContractAddr";

/// Trade event field populated by an extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeField {
    EscrowId,
    XAsset,
    YAsset,
    XAmount,
    YAmount,
    XAddress,
    YAddress,
}

/// Copies one decoded field into one trade event field.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub target: TradeField,
    pub source: String,
    pub kind: FieldKind,
}

/// Stage an event name maps to and what it carries.
#[derive(Clone, Debug)]
pub struct StageRule {
    pub event: &'static str,
    pub stage: TradeStage,
    pub extractions: Vec<Extraction>,
}

/// Classification rules of a single category.
#[derive(Clone, Debug)]
pub struct CategoryRules {
    category: Category,
    stages: Vec<StageRule>,
}

/// Classifier keyed by the contract address the event originates from.
#[derive(Clone, Debug)]
pub struct Classifier {
    rules: HashMap<Address, CategoryRules>,
}

impl TradeField {
    pub fn kind(&self) -> FieldKind {
        match self {
            TradeField::EscrowId | TradeField::XAmount | TradeField::YAmount => FieldKind::Uint,
            _ => FieldKind::Address,
        }
    }
}

impl Extraction {
    fn new(target: TradeField, source: impl Into<String>) -> Self {
        Self {
            target,
            source: source.into(),
            kind: target.kind(),
        }
    }
}

fn amount_field(side: char, kind: AssetKind) -> String {
    format!("{side}{}", kind.amount_suffix())
}

impl CategoryRules {
    pub fn for_category(category: Category) -> Self {
        use TradeField::*;

        let created = vec![
            Extraction::new(EscrowId, ESCROW_INDEX),
            Extraction::new(XAsset, X_TOKEN),
            Extraction::new(YAsset, Y_TOKEN),
            Extraction::new(XAddress, X_OWNER),
            Extraction::new(YAddress, Y_OWNER),
            Extraction::new(XAmount, amount_field('x', category.x_kind())),
            Extraction::new(YAmount, amount_field('y', category.y_kind())),
        ];
        let accepted = vec![
            Extraction::new(EscrowId, ESCROW_INDEX),
            Extraction::new(YAddress, Y_OWNER),
        ];
        // Deployed contracts emit a bare rejection signal; the escrow index is
        // picked up only by schemas declaring it.
        let rejected = vec![Extraction::new(EscrowId, ESCROW_INDEX)];

        Self {
            category,
            stages: vec![
                StageRule {
                    event: ESCROW_CREATED,
                    stage: TradeStage::Create,
                    extractions: created,
                },
                StageRule {
                    event: ESCROW_ACCEPTED,
                    stage: TradeStage::Accept,
                    extractions: accepted,
                },
                StageRule {
                    event: ESCROW_REJECTED,
                    stage: TradeStage::Reject,
                    extractions: rejected,
                },
            ],
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn stage_rule(&self, event: &str) -> Option<&StageRule> {
        self.stages.iter().find(|rule| rule.event == event)
    }

    /// Checks that every field this category extracts from the event, if
    /// declared at all, has the expected type.
    pub(crate) fn validate(&self, descriptor: &EventDescriptor) -> Result<(), SchemaLoadError> {
        let Some(rule) = self.stage_rule(descriptor.name()) else {
            return Ok(());
        };
        for extraction in &rule.extractions {
            let Some(field) = descriptor.field(&extraction.source) else {
                continue;
            };
            if field.kind != extraction.kind {
                return Err(SchemaLoadError::FieldType {
                    category: self.category,
                    event: descriptor.name().to_string(),
                    field: field.name.clone(),
                    expected: extraction.kind,
                    found: field.kind,
                });
            }
        }
        Ok(())
    }

    /// Builds the trade event for a lifecycle event, `None` for any other
    /// event of the schema.
    pub fn apply(&self, event: &str, fields: &DecodedFields) -> Option<TradeEvent> {
        let rule = self.stage_rule(event)?;
        let mut trade = TradeEvent::empty(rule.stage, self.category);
        for extraction in &rule.extractions {
            let Some(value) = fields.get(&extraction.source) else {
                continue;
            };
            match extraction.target {
                TradeField::EscrowId => trade.escrow_id = value.as_uint().unwrap_or_default(),
                TradeField::XAmount => trade.x_amount = value.as_uint().unwrap_or_default(),
                TradeField::YAmount => trade.y_amount = value.as_uint().unwrap_or_default(),
                TradeField::XAsset => trade.x_asset = value.as_address().unwrap_or_default(),
                TradeField::YAsset => trade.y_asset = value.as_address().unwrap_or_default(),
                TradeField::XAddress => trade.x_address = value.as_address().unwrap_or_default(),
                TradeField::YAddress => trade.y_address = value.as_address().unwrap_or_default(),
            }
        }
        Some(trade)
    }
}

/// Classifies a decoded event of the given category.
pub fn classify(event: &str, category: Category, fields: &DecodedFields) -> Option<TradeEvent> {
    CategoryRules::for_category(category).apply(event, fields)
}

impl Classifier {
    pub fn new(registry: &Registry) -> Self {
        let rules = Category::ALL
            .into_iter()
            .filter_map(|category| {
                registry
                    .address_of(category)
                    .map(|address| (address, CategoryRules::for_category(category)))
            })
            .collect();
        Self { rules }
    }

    /// Classifies the event by the contract it was emitted by.
    ///
    /// Events of contracts outside of the table are skipped.
    pub fn classify(&self, event: &DecodedEvent) -> Option<EventContext<TradeEvent>> {
        let address = event.context().address;
        let Some(rules) = self.rules.get(&address) else {
            debug!(%address, event = event.name(), "event of unbound contract skipped");
            return None;
        };
        rules
            .apply(event.name(), event.fields())
            .map(|trade| EventContext::new(*event.context(), trade))
    }
}
