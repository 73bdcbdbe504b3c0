use serde::{Deserialize, Serialize};

use larder_core::{CategoryId, DomainError, DomainResult, Entity, IngredientId};

/// Catalog view of an ingredient, as owned by ingredient management.
///
/// The stock core only reads these. `unit` has no setter; name and category
/// change only through [`Ingredient::rename`] / [`Ingredient::recategorize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    id: IngredientId,
    name: String,
    category_id: CategoryId,
    unit: String,
    minimum_stock: i64,
    expiry_warning_days: i64,
}

impl Ingredient {
    pub fn new(
        id: IngredientId,
        name: impl Into<String>,
        category_id: CategoryId,
        unit: impl Into<String>,
        minimum_stock: i64,
        expiry_warning_days: i64,
    ) -> DomainResult<Self> {
        let name = checked_name(name.into())?;
        let unit = unit.into().trim().to_string();
        if unit.is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if minimum_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }
        if expiry_warning_days < 0 {
            return Err(DomainError::validation(
                "expiry warning lead time cannot be negative",
            ));
        }

        Ok(Self {
            id,
            name,
            category_id,
            unit,
            minimum_stock,
            expiry_warning_days,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> CategoryId {
        self.category_id
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Total remaining below this value counts as low stock.
    pub fn minimum_stock(&self) -> i64 {
        self.minimum_stock
    }

    /// Days before expiry during which a batch is flagged.
    pub fn expiry_warning_days(&self) -> i64 {
        self.expiry_warning_days
    }

    pub fn rename(&mut self, name: impl Into<String>) -> DomainResult<()> {
        self.name = checked_name(name.into())?;
        Ok(())
    }

    pub fn recategorize(&mut self, category_id: CategoryId) {
        self.category_id = category_id;
    }
}

impl Entity for Ingredient {
    type Id = IngredientId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

fn checked_name(name: String) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(trimmed.to_string())
}
