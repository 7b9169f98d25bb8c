//! Interface registry.
//!
//! Binds every [`Category`] to its escrow contract address and event schema,
//! and indexes the schema events by `(signature, contract address)`.
//! The registry is immutable once loaded and is shared between decoders
//! behind an [`std::sync::Arc`].

use std::{
    collections::{HashMap, hash_map},
    fmt,
};

use alloy::{
    dyn_abi::{DynSolEvent, DynSolType, Specifier},
    json_abi::{Event, JsonAbi},
    primitives::{Address, B256},
};
use itertools::Itertools;
use tracing::debug;

use crate::{
    classify::CategoryRules,
    error::SchemaLoadError,
    source::LogFilter,
    types::Category,
};

/// Declared type of an event field, as far as classification cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Address,
    Uint,
    Int,
    Bool,
    FixedBytes,
    Bytes,
    String,
    /// Arrays, tuples and other compound types.
    Composite,
}

/// Named, typed event input.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub indexed: bool,
}

/// Event of a particular category's schema, resolved for decoding.
#[derive(Clone, Debug)]
pub struct EventDescriptor {
    name: String,
    category: Category,
    selector: B256,
    fields: Vec<FieldDescriptor>,
    decoder: DynSolEvent,
}

/// Set of events declared by an escrow contract interface.
#[derive(Clone, Debug, Default)]
pub struct EventSchema {
    events: Vec<Event>,
}

/// Category bound to its contract address and event schema.
#[derive(Clone, Debug)]
pub struct CategoryBinding {
    pub category: Category,
    pub address: Address,
    pub schema: EventSchema,
}

/// Immutable lookup from `(signature, contract address)` to schema event.
#[derive(Debug)]
pub struct Registry {
    addresses: HashMap<Category, Address>,
    categories: HashMap<Address, Category>,
    events: HashMap<(B256, Address), EventDescriptor>,
}

impl FieldKind {
    pub fn of(ty: &DynSolType) -> Self {
        match ty {
            DynSolType::Address => Self::Address,
            DynSolType::Uint(_) => Self::Uint,
            DynSolType::Int(_) => Self::Int,
            DynSolType::Bool => Self::Bool,
            DynSolType::FixedBytes(_) => Self::FixedBytes,
            DynSolType::Bytes => Self::Bytes,
            DynSolType::String => Self::String,
            _ => Self::Composite,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Address => "address",
            FieldKind::Uint => "uint",
            FieldKind::Int => "int",
            FieldKind::Bool => "bool",
            FieldKind::FixedBytes => "fixed bytes",
            FieldKind::Bytes => "bytes",
            FieldKind::String => "string",
            FieldKind::Composite => "composite",
        };
        f.write_str(name)
    }
}

impl EventSchema {
    /// Loads events from a JSON ABI document, other ABI items are ignored.
    pub fn from_json(json: &str) -> Result<Self, SchemaLoadError> {
        let abi: JsonAbi = serde_json::from_str(json)?;
        Ok(Self::from_abi(&abi))
    }

    /// Parses human-readable declarations like
    /// `event EscrowAccepted(uint256 escrowIndex, address yOwner)`.
    pub fn parse<'a>(
        declarations: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, SchemaLoadError> {
        let events = declarations
            .into_iter()
            .map(|d| {
                Event::parse(d).map_err(|e| SchemaLoadError::Declaration(format!("{d}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { events })
    }

    pub fn from_abi(abi: &JsonAbi) -> Self {
        Self {
            events: abi.events().cloned().collect(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl CategoryBinding {
    pub fn new(category: Category, address: Address, schema: EventSchema) -> Self {
        Self {
            category,
            address,
            schema,
        }
    }
}

impl EventDescriptor {
    fn resolve(category: Category, event: &Event) -> Result<Self, SchemaLoadError> {
        let unresolvable = |reason: String| SchemaLoadError::Unresolvable {
            event: event.signature(),
            reason,
        };
        let fields = event
            .inputs
            .iter()
            .map(|param| {
                let ty: DynSolType = param.resolve().map_err(|e| unresolvable(e.to_string()))?;
                Ok(FieldDescriptor {
                    name: param.name.clone(),
                    kind: FieldKind::of(&ty),
                    indexed: param.indexed,
                })
            })
            .collect::<Result<Vec<_>, SchemaLoadError>>()?;
        let decoder: DynSolEvent = event.resolve().map_err(|e| unresolvable(e.to_string()))?;

        Ok(Self {
            name: event.name.clone(),
            category,
            selector: event.selector(),
            fields,
            decoder,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Signature identifier, the first topic of every log of this event.
    pub fn selector(&self) -> B256 {
        self.selector
    }

    /// Inputs in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub(crate) fn decoder(&self) -> &DynSolEvent {
        &self.decoder
    }
}

impl Registry {
    /// Builds the registry out of exactly one binding per category.
    ///
    /// Fails on unresolvable declarations, on contract address sharing between
    /// categories and on lifecycle events whose fields do not have the types
    /// trade classification expects.
    pub fn load(
        bindings: impl IntoIterator<Item = CategoryBinding>,
    ) -> Result<Self, SchemaLoadError> {
        let mut addresses = HashMap::new();
        let mut categories = HashMap::new();
        let mut events = HashMap::new();

        for binding in bindings {
            if addresses.insert(binding.category, binding.address).is_some() {
                return Err(SchemaLoadError::DuplicateCategory(binding.category));
            }
            match categories.entry(binding.address) {
                hash_map::Entry::Occupied(e) => {
                    return Err(SchemaLoadError::SharedAddress {
                        address: binding.address,
                        first: *e.get(),
                        second: binding.category,
                    });
                }
                hash_map::Entry::Vacant(e) => {
                    e.insert(binding.category);
                }
            }

            let rules = CategoryRules::for_category(binding.category);
            for event in binding.schema.events() {
                if event.anonymous {
                    debug!(
                        category = %binding.category,
                        event = %event.name,
                        "skipping anonymous event"
                    );
                    continue;
                }
                let descriptor = EventDescriptor::resolve(binding.category, event)?;
                rules.validate(&descriptor)?;
                match events.entry((descriptor.selector, binding.address)) {
                    hash_map::Entry::Occupied(_) => {
                        return Err(SchemaLoadError::DuplicateEvent {
                            category: binding.category,
                            event: event.signature(),
                        });
                    }
                    hash_map::Entry::Vacant(e) => {
                        e.insert(descriptor);
                    }
                }
            }
        }

        if let Some(missing) = Category::ALL.iter().find(|c| !addresses.contains_key(c)) {
            return Err(SchemaLoadError::MissingCategory(*missing));
        }

        Ok(Self {
            addresses,
            categories,
            events,
        })
    }

    /// Schema event bound to the given signature topic and contract.
    pub fn lookup(&self, topic: &B256, address: &Address) -> Option<&EventDescriptor> {
        self.events.get(&(*topic, *address))
    }

    pub fn category_of(&self, address: &Address) -> Option<Category> {
        self.categories.get(address).copied()
    }

    pub fn address_of(&self, category: Category) -> Option<Address> {
        self.addresses.get(&category).copied()
    }

    /// Bound contract addresses, in category order.
    pub fn addresses(&self) -> Vec<Address> {
        self.addresses
            .iter()
            .sorted_by_key(|(category, _)| **category)
            .map(|(_, address)| *address)
            .collect()
    }

    /// Events of the given category's schema.
    pub fn events(&self, category: Category) -> impl Iterator<Item = &EventDescriptor> {
        self.events
            .values()
            .filter(move |descriptor| descriptor.category == category)
    }

    /// Subscription filter covering all bound contracts.
    pub fn filter(&self, from_block: u64) -> LogFilter {
        LogFilter::new(self.addresses(), from_block)
    }
}
