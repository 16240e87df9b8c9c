use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::DatabaseID;

#[derive(thiserror::Error, Debug)]
#[error("{0} is not a valid category name")]
pub struct CategoryNameError(pub String);

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// # Errors
    ///
    /// This function will return an error if `name` is an empty string.
    pub fn new(name: String) -> Result<Self, CategoryNameError> {
        if name.is_empty() {
            Err(CategoryNameError(name))
        } else {
            Ok(Self(name))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("{0} is not a valid category kind")]
pub struct CategoryKindError(pub String);

/// Whether a category groups money coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = CategoryKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(CategoryKind::Income),
            "expense" => Ok(CategoryKind::Expense),
            other => Err(CategoryKindError(other.to_string())),
        }
    }
}

/// A category for expenses and income, e.g., 'Groceries', 'Rent', 'Wages'.
///
/// Categories are shared between all users of the application, they are not
/// scoped to the user that created them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    id: DatabaseID,
    name: CategoryName,
    kind: CategoryKind,
    color: String,
    icon: String,
}

impl Category {
    /// Create a new category.
    ///
    /// Note that this does *not* add the category to the application database.
    pub fn new(
        id: DatabaseID,
        name: CategoryName,
        kind: CategoryKind,
        color: String,
        icon: String,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            color,
            icon,
        }
    }

    pub fn id(&self) -> DatabaseID {
        self.id
    }

    pub fn name(&self) -> &CategoryName {
        &self.name
    }

    pub fn kind(&self) -> CategoryKind {
        self.kind
    }

    /// The display color for the category, e.g. a hex code.
    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }
}

/// The data for creating a new category.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: CategoryName,
    pub kind: CategoryKind,
    pub color: String,
    pub icon: String,
}
