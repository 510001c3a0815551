//! Declaration state machine.
//!
//! ```text
//! Draft ──▶ Priced ──▶ Paid
//!   │         │ ▲
//!   │         └─┘ (re-price)
//!   └────┬────┘
//!        ▼
//!     Deleted
//! ```
//!
//! `Paid` and `Deleted` are terminal.

use rust_decimal::Decimal;

use super::domain::{Declaration, DeclarationId, DeclarationStatus, PricingSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Price,
    Pay,
    Delete,
}

impl LifecycleAction {
    pub const fn label(self) -> &'static str {
        match self {
            LifecycleAction::Price => "priced",
            LifecycleAction::Pay => "paid",
            LifecycleAction::Delete => "deleted",
        }
    }

    fn permits(self, status: DeclarationStatus) -> bool {
        match self {
            LifecycleAction::Price | LifecycleAction::Delete => {
                matches!(status, DeclarationStatus::Draft | DeclarationStatus::Priced)
            }
            LifecycleAction::Pay => status == DeclarationStatus::Priced,
        }
    }
}

/// Operation attempted from a state that does not allow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("declaration {id} cannot be {} while {status}", .action.label())]
pub struct LifecycleError {
    pub id: DeclarationId,
    pub status: DeclarationStatus,
    pub action: LifecycleAction,
}

impl Declaration {
    pub fn ensure(&self, action: LifecycleAction) -> Result<(), LifecycleError> {
        if action.permits(self.status) {
            Ok(())
        } else {
            Err(LifecycleError {
                id: self.id.clone(),
                status: self.status,
                action,
            })
        }
    }

    pub(crate) fn apply_pricing(
        &mut self,
        principal: Decimal,
        penalty: Decimal,
        snapshot: PricingSnapshot,
    ) -> Result<(), LifecycleError> {
        self.ensure(LifecycleAction::Price)?;
        self.principal = Some(principal);
        self.penalty = Some(penalty);
        self.pricing = Some(snapshot);
        self.status = DeclarationStatus::Priced;
        Ok(())
    }

    pub(crate) fn mark_paid(&mut self) -> Result<(), LifecycleError> {
        self.ensure(LifecycleAction::Pay)?;
        self.status = DeclarationStatus::Paid;
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) -> Result<(), LifecycleError> {
        self.ensure(LifecycleAction::Delete)?;
        self.status = DeclarationStatus::Deleted;
        Ok(())
    }
}
