use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledger_core::{
    models::{
        AppliedDebit, AuditLog, AuditLogData, CreditBalance, CreditGrant, CreditReceipt,
        CreditTransaction, DailyCharge, DebitOutcome, NewServiceRate, PurchaseTransition,
        ServiceRate, TransactionKind, TransactionStatus, UsageDebit, UsageFilter, UsageRecord,
        UsageTypeTotal,
    },
    money::normalize_credits,
    traits::{
        AuditLogRepository, BalanceStore, DailyChargeRepository, PurchaseStore, RateRepository,
        UsageLedger,
    },
    AppError, AppResult,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Uuid, CreditBalance>,
    usage: Vec<UsageRecord>,
    transactions: Vec<CreditTransaction>,
    rates: BTreeMap<String, ServiceRate>,
    charges: HashMap<(Uuid, NaiveDate), DailyCharge>,
    audit: Vec<AuditLog>,
    unavailable: bool,
}

impl LedgerState {
    fn check_available(&self) -> AppResult<()> {
        if self.unavailable {
            return Err(AppError::StorageUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn balance_entry(&mut self, account_id: Uuid) -> &mut CreditBalance {
        self.balances
            .entry(account_id)
            .or_insert_with(|| CreditBalance::empty(account_id))
    }

    fn credit(&mut self, account_id: Uuid, kind: TransactionKind, credits: Decimal) -> CreditBalance {
        let balance = self.balance_entry(account_id);
        balance.balance += credits;
        match kind {
            TransactionKind::Purchase => balance.total_purchased += credits,
            TransactionKind::Bonus => balance.total_bonus += credits,
        }
        balance.updated_at = Utc::now();
        balance.clone()
    }

    fn transaction_mut(&mut self, id: Uuid) -> Option<&mut CreditTransaction> {
        self.transactions.iter_mut().find(|t| t.id == id)
    }
}

/// In-memory ledger store
///
/// Holds balances, usage, transactions, rates, the uptime log, and audit
/// entries behind a single mutex.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Number of uptime log rows
    pub fn charge_count(&self) -> usize {
        self.state.lock().charges.len()
    }

    /// Number of usage records
    pub fn usage_count(&self) -> usize {
        self.state.lock().usage.len()
    }

    /// Audit entries recorded so far
    pub fn audit_entries(&self) -> Vec<AuditLog> {
        self.state.lock().audit.clone()
    }
}

#[async_trait]
impl BalanceStore for MemoryLedger {
    async fn find_balance(&self, account_id: Uuid) -> AppResult<Option<CreditBalance>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.balances.get(&account_id).cloned())
    }

    #[instrument(skip(self, debit), fields(account_id = %debit.account_id, amount = %debit.amount))]
    async fn apply_debit(&self, debit: &UsageDebit) -> AppResult<DebitOutcome> {
        let mut state = self.state.lock();
        state.check_available()?;

        if let Some(key) = &debit.daily_charge {
            if state.charges.contains_key(&(key.entity_id, key.charged_date)) {
                debug!("Entity {} already charged for {}", key.entity_id, key.charged_date);
                return Ok(DebitOutcome::AlreadyCharged {
                    entity_id: key.entity_id,
                    charged_date: key.charged_date,
                });
            }
        }

        let available = state.balance_entry(debit.account_id).balance;
        if available < debit.amount {
            return Ok(DebitOutcome::Insufficient {
                required: debit.amount,
                available,
            });
        }

        let now = Utc::now();
        let balance = state.balance_entry(debit.account_id);
        let balance_before = balance.balance;
        balance.balance -= debit.amount;
        balance.total_used += debit.amount;
        balance.updated_at = now;
        let balance_after = balance.balance;

        let usage = debit.to_record(balance_after, now);
        state.usage.push(usage.clone());

        if let Some(key) = &debit.daily_charge {
            state.charges.insert(
                (key.entity_id, key.charged_date),
                DailyCharge {
                    id: Uuid::now_v7(),
                    entity_id: key.entity_id,
                    entity_kind: key.entity_kind,
                    account_id: debit.account_id,
                    charged_date: key.charged_date,
                    amount: debit.amount,
                    balance_before,
                    balance_after,
                    usage_id: usage.id,
                    created_at: now,
                },
            );
        }

        Ok(DebitOutcome::Applied(AppliedDebit {
            usage,
            balance_before,
            balance_after,
        }))
    }

    async fn apply_credit(&self, grant: &CreditGrant) -> AppResult<CreditReceipt> {
        let mut state = self.state.lock();
        state.check_available()?;

        let balance = state.credit(grant.account_id, grant.kind, grant.credits);
        let now = Utc::now();
        let transaction = CreditTransaction {
            id: grant.transaction_id,
            account_id: grant.account_id,
            kind: grant.kind,
            amount_usd: Decimal::ZERO,
            credits_amount: grant.credits,
            status: TransactionStatus::Completed,
            external_ref: None,
            failure_reason: None,
            description: Some(grant.description.clone()),
            metadata: grant.metadata.clone(),
            created_at: now,
            completed_at: Some(now),
        };
        state.transactions.push(transaction.clone());

        Ok(CreditReceipt {
            transaction,
            balance,
        })
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn find_usage(&self, id: Uuid) -> AppResult<Option<UsageRecord>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.usage.iter().find(|u| u.id == id).cloned())
    }

    async fn list_usage(
        &self,
        account_id: Uuid,
        filter: &UsageFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<UsageRecord>, i64)> {
        let state = self.state.lock();
        state.check_available()?;

        let matching: Vec<&UsageRecord> = state
            .usage
            .iter()
            .rev()
            .filter(|u| u.account_id == account_id && filter.matches(u))
            .collect();
        let total = matching.len() as i64;

        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn usage_stats(
        &self,
        account_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<UsageTypeTotal>> {
        let state = self.state.lock();
        state.check_available()?;

        let filter = UsageFilter {
            from,
            to,
            usage_type: None,
        };
        let mut totals: BTreeMap<&'static str, UsageTypeTotal> = BTreeMap::new();
        for usage in state
            .usage
            .iter()
            .filter(|u| u.account_id == account_id && filter.matches(u))
        {
            let total = totals
                .entry(usage.usage_type.as_str())
                .or_insert_with(|| UsageTypeTotal {
                    usage_type: usage.usage_type,
                    count: 0,
                    credits: Decimal::ZERO,
                });
            total.count += 1;
            total.credits += usage.credits_used;
        }

        Ok(totals.into_values().collect())
    }
}

#[async_trait]
impl PurchaseStore for MemoryLedger {
    async fn create_pending(&self, tx: &CreditTransaction) -> AppResult<CreditTransaction> {
        let mut state = self.state.lock();
        state.check_available()?;

        let mut stored = tx.clone();
        stored.status = TransactionStatus::Pending;
        state.transactions.push(stored.clone());
        Ok(stored)
    }

    async fn find_transaction(&self, id: Uuid) -> AppResult<Option<CreditTransaction>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn complete(
        &self,
        id: Uuid,
        external_ref: Option<&str>,
    ) -> AppResult<Option<PurchaseTransition>> {
        let mut state = self.state.lock();
        state.check_available()?;

        let Some(tx) = state.transaction_mut(id) else {
            return Ok(None);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(Some(PurchaseTransition::Unchanged(tx.clone())));
        }

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(Utc::now());
        if let Some(reference) = external_ref {
            tx.external_ref = Some(reference.to_string());
        }
        let transaction = tx.clone();

        let balance = state.credit(
            transaction.account_id,
            TransactionKind::Purchase,
            transaction.credits_amount,
        );

        Ok(Some(PurchaseTransition::Applied {
            transaction,
            balance: Some(balance),
        }))
    }

    async fn fail(&self, id: Uuid, reason: &str) -> AppResult<Option<PurchaseTransition>> {
        let mut state = self.state.lock();
        state.check_available()?;

        let Some(tx) = state.transaction_mut(id) else {
            return Ok(None);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(Some(PurchaseTransition::Unchanged(tx.clone())));
        }

        tx.status = TransactionStatus::Failed;
        tx.failure_reason = Some(reason.to_string());
        tx.completed_at = Some(Utc::now());

        Ok(Some(PurchaseTransition::Applied {
            transaction: tx.clone(),
            balance: None,
        }))
    }

    async fn list_by_account(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<CreditTransaction>, i64)> {
        let state = self.state.lock();
        state.check_available()?;

        let matching: Vec<&CreditTransaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .collect();
        let total = matching.len() as i64;

        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }
}

#[async_trait]
impl RateRepository for MemoryLedger {
    async fn find_by_key(&self, service_key: &str) -> AppResult<Option<ServiceRate>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.rates.get(service_key).cloned())
    }

    async fn list(&self, include_inactive: bool) -> AppResult<Vec<ServiceRate>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state
            .rates
            .values()
            .filter(|r| include_inactive || r.is_active)
            .cloned()
            .collect())
    }

    async fn create(&self, rate: &NewServiceRate) -> AppResult<ServiceRate> {
        let mut state = self.state.lock();
        state.check_available()?;

        if state.rates.contains_key(&rate.service_key) {
            return Err(AppError::AlreadyExists(format!(
                "Rate {} already exists",
                rate.service_key
            )));
        }

        let stored = rate.clone().into_rate(Utc::now());
        state.rates.insert(stored.service_key.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_cost(
        &self,
        service_key: &str,
        cost_per_unit: Decimal,
    ) -> AppResult<Option<ServiceRate>> {
        let mut state = self.state.lock();
        state.check_available()?;

        Ok(state.rates.get_mut(service_key).map(|rate| {
            rate.cost_per_unit = normalize_credits(cost_per_unit);
            rate.updated_at = Utc::now();
            rate.clone()
        }))
    }

    async fn set_active(&self, service_key: &str, is_active: bool) -> AppResult<Option<ServiceRate>> {
        let mut state = self.state.lock();
        state.check_available()?;

        Ok(state.rates.get_mut(service_key).map(|rate| {
            rate.is_active = is_active;
            rate.updated_at = Utc::now();
            rate.clone()
        }))
    }
}

#[async_trait]
impl DailyChargeRepository for MemoryLedger {
    async fn find_charge(
        &self,
        entity_id: Uuid,
        charged_date: NaiveDate,
    ) -> AppResult<Option<DailyCharge>> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.charges.get(&(entity_id, charged_date)).cloned())
    }

    async fn list_for_entity(
        &self,
        entity_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<DailyCharge>> {
        let state = self.state.lock();
        state.check_available()?;

        let mut charges: Vec<DailyCharge> = state
            .charges
            .values()
            .filter(|c| {
                c.entity_id == entity_id
                    && from.map_or(true, |from| c.charged_date >= from)
                    && to.map_or(true, |to| c.charged_date <= to)
            })
            .cloned()
            .collect();
        charges.sort_by(|a, b| b.charged_date.cmp(&a.charged_date));

        Ok(charges)
    }
}

#[async_trait]
impl AuditLogRepository for MemoryLedger {
    async fn record(&self, entry: AuditLogData) -> AppResult<()> {
        let mut state = self.state.lock();
        state.check_available()?;

        let id = state.audit.len() as i64 + 1;
        state.audit.push(AuditLog {
            id,
            actor: entry.actor,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            ip_address: entry.ip_address,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::models::{DailyChargeKey, EntityKind, UsageType};
    use rust_decimal_macros::dec;

    fn debit(account_id: Uuid, amount: Decimal) -> UsageDebit {
        UsageDebit {
            usage_id: Uuid::now_v7(),
            account_id,
            entity_id: None,
            amount,
            usage_type: UsageType::Feature,
            description: "test".to_string(),
            reference_id: None,
            reference_type: None,
            metadata: None,
            daily_charge: None,
        }
    }

    async fn funded(store: &MemoryLedger, credits: Decimal) -> Uuid {
        let account = Uuid::new_v4();
        store
            .apply_credit(&CreditGrant {
                transaction_id: Uuid::now_v7(),
                account_id: account,
                kind: TransactionKind::Bonus,
                credits,
                description: "seed".to_string(),
                metadata: None,
            })
            .await
            .unwrap();
        account
    }

    #[tokio::test]
    async fn test_debit_updates_balance_and_usage() {
        let store = MemoryLedger::new();
        let account = funded(&store, dec!(5.0000)).await;

        let outcome = store.apply_debit(&debit(account, dec!(2.0000))).await.unwrap();
        let DebitOutcome::Applied(applied) = outcome else {
            panic!("expected applied debit");
        };
        assert_eq!(applied.balance_before, dec!(5.0000));
        assert_eq!(applied.balance_after, dec!(3.0000));

        let balance = store.find_balance(account).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(3.0000));
        assert!(balance.is_consistent());
        assert_eq!(store.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_debit_changes_nothing() {
        let store = MemoryLedger::new();
        let account = funded(&store, dec!(0.3000)).await;

        let outcome = store.apply_debit(&debit(account, dec!(0.5000))).await.unwrap();
        assert!(matches!(
            outcome,
            DebitOutcome::Insufficient { required, available }
                if required == dec!(0.5000) && available == dec!(0.3000)
        ));
        assert_eq!(store.usage_count(), 0);
        assert_eq!(
            store.find_balance(account).await.unwrap().unwrap().balance,
            dec!(0.3000)
        );
    }

    #[tokio::test]
    async fn test_daily_charge_key_blocks_second_debit() {
        let store = MemoryLedger::new();
        let account = funded(&store, dec!(5.0000)).await;
        let entity = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut first = debit(account, dec!(1.0000));
        first.daily_charge = Some(DailyChargeKey::new(entity, EntityKind::Store, date));
        let mut second = first.clone();
        second.usage_id = Uuid::now_v7();

        assert!(matches!(
            store.apply_debit(&first).await.unwrap(),
            DebitOutcome::Applied(_)
        ));
        assert!(matches!(
            store.apply_debit(&second).await.unwrap(),
            DebitOutcome::AlreadyCharged { .. }
        ));

        assert_eq!(store.charge_count(), 1);
        assert_eq!(store.usage_count(), 1);
        assert_eq!(
            store.find_balance(account).await.unwrap().unwrap().balance,
            dec!(4.0000)
        );
    }

    #[tokio::test]
    async fn test_charged_key_wins_over_empty_balance() {
        let store = MemoryLedger::new();
        let account = funded(&store, dec!(1.0000)).await;
        let entity = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut first = debit(account, dec!(1.0000));
        first.daily_charge = Some(DailyChargeKey::new(entity, EntityKind::Store, date));
        let mut second = first.clone();
        second.usage_id = Uuid::now_v7();

        assert!(matches!(
            store.apply_debit(&first).await.unwrap(),
            DebitOutcome::Applied(_)
        ));
        assert!(matches!(
            store.apply_debit(&second).await.unwrap(),
            DebitOutcome::AlreadyCharged { entity_id, charged_date }
                if entity_id == entity && charged_date == date
        ));
        assert_eq!(store.usage_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_purchase_credits_once() {
        let store = MemoryLedger::new();
        let account = Uuid::new_v4();
        let pending = store
            .create_pending(&CreditTransaction::pending_purchase(
                account,
                dec!(10.00),
                dec!(100.0000),
                None,
            ))
            .await
            .unwrap();

        let first = store.complete(pending.id, Some("ch_1")).await.unwrap();
        assert!(matches!(first, Some(PurchaseTransition::Applied { .. })));
        let second = store.complete(pending.id, Some("ch_1")).await.unwrap();
        assert!(matches!(second, Some(PurchaseTransition::Unchanged(_))));

        let balance = store.find_balance(account).await.unwrap().unwrap();
        assert_eq!(balance.balance, dec!(100.0000));
        assert_eq!(balance.total_purchased, dec!(100.0000));
        assert!(store.complete(Uuid::new_v4(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_systemically() {
        let store = MemoryLedger::new();
        store.set_unavailable(true);

        let err = store.find_balance(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_systemic());
    }
}
