/// Pattern routed to the sale-create handler.
pub const SALE_CREATE: &str = "sale.create";
/// Pattern routed to the sale-update handler.
pub const SALE_UPDATE: &str = "sale.update";

/// Names used by older publishers for the same two handlers.
pub const LEGACY_SALE_CREATE: &str = "createSaleProcessor";
pub const LEGACY_SALE_UPDATE: &str = "updateSaleProcessor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalePattern {
    Create,
    Update,
}

impl SalePattern {
    pub fn parse(pattern: &str) -> Option<Self> {
        match pattern {
            SALE_CREATE | LEGACY_SALE_CREATE => Some(Self::Create),
            SALE_UPDATE | LEGACY_SALE_UPDATE => Some(Self::Update),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => SALE_CREATE,
            Self::Update => SALE_UPDATE,
        }
    }

    pub fn is_legacy(pattern: &str) -> bool {
        matches!(pattern, LEGACY_SALE_CREATE | LEGACY_SALE_UPDATE)
    }
}
