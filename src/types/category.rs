use std::fmt;

use serde::Serialize;

/// Kind of asset on one side of an escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// ERC-20 like token, the side carries a transferable quantity.
    Fungible,

    /// ERC-721 like token, the side carries a token index.
    NonFungible,
}

impl AssetKind {
    /// Suffix of the schema field carrying the side's amount or index.
    pub fn amount_suffix(&self) -> &'static str {
        match self {
            AssetKind::Fungible => "Amount",
            AssetKind::NonFungible => "Index",
        }
    }

    fn standard(&self) -> &'static str {
        match self {
            AssetKind::Fungible => "20",
            AssetKind::NonFungible => "721",
        }
    }
}

/// Asset pair category, one per escrow contract.
///
/// The first letter describes the `x` (offering) side, the second one
/// the `y` (counter) side: `F` for fungible, `N` for non-fungible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Category {
    FF,
    FN,
    NF,
    NN,
}

impl Category {
    pub const ALL: [Category; 4] = [Category::FF, Category::FN, Category::NF, Category::NN];

    pub fn x_kind(&self) -> AssetKind {
        match self {
            Category::FF | Category::FN => AssetKind::Fungible,
            Category::NF | Category::NN => AssetKind::NonFungible,
        }
    }

    pub fn y_kind(&self) -> AssetKind {
        match self {
            Category::FF | Category::NF => AssetKind::Fungible,
            Category::FN | Category::NN => AssetKind::NonFungible,
        }
    }

    /// Token standards label, e.g. `20-721` for [`Category::FN`].
    pub fn trade_type(&self) -> String {
        format!("{}-{}", self.x_kind().standard(), self.y_kind().standard())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::FF => "FF",
            Category::FN => "FN",
            Category::NF => "NF",
            Category::NN => "NN",
        };
        f.write_str(label)
    }
}
