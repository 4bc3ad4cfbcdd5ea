//! Structured model of a Brotli stream
//!
//! A stream is a window size followed by meta-blocks. Compressed meta-blocks
//! carry a [`CompressedHeader`] (block type information, context maps and
//! prefix codes) and [`CompressedData`] (insert&copy commands plus block
//! switches).

mod block_type;
mod context;
mod data;
mod distance;
mod header;
mod insert_copy;
mod meta_block;

pub use block_type::{
    BLOCK_LENGTH_CODES, BlockLengthCode, BlockSwitchCoding, BlockSwitchCommand, BlockTypeCode,
    BlockTypeInfo, BlockTypeTracker, MAX_BLOCK_TYPES,
};
pub(crate) use block_type::BlockSwitchTracker;
pub use context::{
    ContextMap, DISTANCE_CONTEXTS, LITERAL_CONTEXTS, LiteralContextMode, distance_context_id,
    inverse_move_to_front, move_to_front,
};
pub use data::CompressedData;
pub use distance::{
    DistanceCode, DistanceCodeFamily, DistanceInfo, DistanceParameters, DistanceRingBuffer,
    MAX_ALLOWED_DISTANCE,
};
pub use header::{CompressedHeader, LITERAL_CODES};
pub use insert_copy::{
    INSERT_COPY_CODES, InsertCopyCommand, InsertCopyLengthCode, copy_length_code, insert_length_code,
};
pub use meta_block::{CompressedMetaBlock, DataLength, MAX_META_BLOCK_LENGTH, MetaBlock};

use std::fmt;
use std::ops::{Index, IndexMut};

/// The three symbol categories that have their own block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Literal bytes
    Literal,
    /// Insert&copy length codes
    InsertCopy,
    /// Distance codes
    Distance,
}

impl Category {
    /// All categories in stream order
    pub const ALL: [Self; 3] = [Self::Literal, Self::InsertCopy, Self::Distance];

    /// Short name used in errors and markers
    pub fn name(self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::InsertCopy => "insert&copy",
            Self::Distance => "distance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per [`Category`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerCategory<T> {
    /// Literal value
    pub literal: T,
    /// Insert&copy value
    pub insert_copy: T,
    /// Distance value
    pub distance: T,
}

impl<T> PerCategory<T> {
    /// Build from one value per category
    pub fn new(literal: T, insert_copy: T, distance: T) -> Self {
        Self {
            literal,
            insert_copy,
            distance,
        }
    }

    /// Build by calling `f` for each category in stream order
    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        let literal = f(Category::Literal);
        let insert_copy = f(Category::InsertCopy);
        let distance = f(Category::Distance);
        Self::new(literal, insert_copy, distance)
    }

    /// Build by calling a fallible `f` for each category in stream order
    pub fn try_from_fn<E>(mut f: impl FnMut(Category) -> Result<T, E>) -> Result<Self, E> {
        let literal = f(Category::Literal)?;
        let insert_copy = f(Category::InsertCopy)?;
        let distance = f(Category::Distance)?;
        Ok(Self::new(literal, insert_copy, distance))
    }

    /// Convert every value
    pub fn map<U>(self, mut f: impl FnMut(Category, T) -> U) -> PerCategory<U> {
        PerCategory {
            literal: f(Category::Literal, self.literal),
            insert_copy: f(Category::InsertCopy, self.insert_copy),
            distance: f(Category::Distance, self.distance),
        }
    }

    /// Borrow every value
    pub fn as_ref(&self) -> PerCategory<&T> {
        PerCategory::new(&self.literal, &self.insert_copy, &self.distance)
    }

    /// Iterate `(category, value)` in stream order
    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        [
            (Category::Literal, &self.literal),
            (Category::InsertCopy, &self.insert_copy),
            (Category::Distance, &self.distance),
        ]
        .into_iter()
    }
}

impl<T> Index<Category> for PerCategory<T> {
    type Output = T;

    fn index(&self, category: Category) -> &T {
        match category {
            Category::Literal => &self.literal,
            Category::InsertCopy => &self.insert_copy,
            Category::Distance => &self.distance,
        }
    }
}

impl<T> IndexMut<Category> for PerCategory<T> {
    fn index_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::Literal => &mut self.literal,
            Category::InsertCopy => &mut self.insert_copy,
            Category::Distance => &mut self.distance,
        }
    }
}
