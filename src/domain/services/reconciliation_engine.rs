//! Position reconciliation engine
//!
//! Turns an account snapshot plus one executed fill into the complete set of
//! rows that must change: the position, the account balances and, on a close,
//! one earning. The engine performs no I/O and either returns the whole
//! bundle or an error with nothing to persist.

use crate::domain::entities::account::AccountSnapshot;
use crate::domain::entities::bundle::{PositionChange, ReconciliationBundle};
use crate::domain::entities::earning::Earning;
use crate::domain::entities::order::Fill;
use crate::domain::entities::position::Position;
use crate::domain::errors::ReconcileError;
use crate::domain::services::fee_calculator::{self, FeeSchedule};
use crate::domain::value_objects::Settlement;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ReconciliationEngine {
    fees: Arc<dyn FeeSchedule>,
}

impl ReconciliationEngine {
    pub fn new(fees: Arc<dyn FeeSchedule>) -> Self {
        Self { fees }
    }

    pub fn reconcile(
        &self,
        snapshot: &AccountSnapshot,
        fill: &Fill,
    ) -> Result<ReconciliationBundle, ReconcileError> {
        fill.validate()?;

        if fill.account_id != snapshot.account.id {
            return Err(ReconcileError::InvalidOrder(format!(
                "fill for account {} applied to snapshot of account {}",
                fill.account_id, snapshot.account.id
            )));
        }

        let fee = self.fees.fee(&fill.symbol);
        let settlement = self.fees.settlement(&fill.symbol);

        let bundle = if fill.side.is_opening() {
            self.open(snapshot, fill, fee, settlement)?
        } else {
            self.close(snapshot, fill, fee, settlement)?
        };

        ensure_solvent(&bundle)?;

        debug!(
            "Reconciled {} {} {} @ {} for account {} (fee {}, settlement {})",
            fill.side, fill.quantity, fill.symbol, fill.price, fill.account_id, fee, settlement
        );

        Ok(bundle)
    }

    fn open(
        &self,
        snapshot: &AccountSnapshot,
        fill: &Fill,
        fee: Decimal,
        settlement: Settlement,
    ) -> Result<ReconciliationBundle, ReconcileError> {
        let position = match snapshot.find_position(&fill.symbol, fill.side, fill.backtest) {
            Some(existing) => existing
                .extend(fill.price, fill.quantity)
                .ok_or_else(|| overflow(fill))?,
            None => Position::open(
                &fill.account_id,
                &fill.symbol,
                fill.side,
                fill.price,
                fill.quantity,
                fill.backtest,
            ),
        };

        let cost = fill
            .price
            .checked_mul(fill.quantity)
            .and_then(|notional| notional.checked_add(fee))
            .ok_or_else(|| overflow(fill))?;

        let mut account = snapshot.account.clone();
        account
            .adjust(settlement, -cost)
            .ok_or_else(|| overflow(fill))?;

        Ok(ReconciliationBundle {
            position: PositionChange::Upsert(position),
            account,
            earning: None,
            fee,
            settlement,
        })
    }

    fn close(
        &self,
        snapshot: &AccountSnapshot,
        fill: &Fill,
        fee: Decimal,
        settlement: Settlement,
    ) -> Result<ReconciliationBundle, ReconcileError> {
        let position_side = fill.side.position_side();
        let position = snapshot
            .find_position(&fill.symbol, position_side, fill.backtest)
            .ok_or_else(|| ReconcileError::NoOffsettingPosition {
                account_id: fill.account_id.clone(),
                symbol: fill.symbol.clone(),
                side: position_side,
            })?;

        if fill.quantity > position.quantity {
            return Err(ReconcileError::OverClose {
                symbol: fill.symbol.clone(),
                requested: fill.quantity,
                open: position.quantity,
            });
        }

        let total_fee = fee.checked_mul(Decimal::TWO).ok_or_else(|| overflow(fill))?;
        let profit = fee_calculator::profit(
            position_side,
            position.price,
            fill.price,
            fill.quantity,
            total_fee,
        )
        .ok_or_else(|| overflow(fill))?;

        // Proceeds are the exit value on either side; only the profit is mirrored
        let credit = fill
            .price
            .checked_mul(fill.quantity)
            .and_then(|proceeds| proceeds.checked_sub(total_fee))
            .ok_or_else(|| overflow(fill))?;

        let mut account = snapshot.account.clone();
        account
            .adjust(settlement, credit)
            .ok_or_else(|| overflow(fill))?;

        let remaining = position.reduce(fill.quantity);
        let change = if remaining.quantity.is_zero() {
            PositionChange::Delete(position.key())
        } else {
            PositionChange::Upsert(remaining)
        };

        let earning = Earning::new(
            &fill.account_id,
            &fill.symbol,
            position_side,
            position.price,
            fill.price,
            fill.quantity,
            total_fee,
            profit,
            fill.backtest,
        );

        Ok(ReconciliationBundle {
            position: change,
            account,
            earning: Some(earning),
            fee,
            settlement,
        })
    }
}

fn overflow(fill: &Fill) -> ReconcileError {
    ReconcileError::InvalidOrder(format!(
        "amounts for {} {} @ {} are out of range",
        fill.quantity, fill.symbol, fill.price
    ))
}

fn ensure_solvent(bundle: &ReconciliationBundle) -> Result<(), ReconcileError> {
    for settlement in [Settlement::Fiat, Settlement::AltCoin] {
        let resulting = bundle.account.balance_for(settlement);
        if resulting.is_sign_negative() && !resulting.is_zero() {
            return Err(ReconcileError::InsufficientFunds {
                settlement,
                resulting,
            });
        }
    }
    Ok(())
}
