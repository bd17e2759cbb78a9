//! RewardEligibilityGate - 報酬取得の適格性判定と払い出し
//!
//! 適格性はライフサイクル状態と外部のプールシグナルから導出する:
//! `can_grab = state == Active && pool == Active`。
//!
//! このコンポーネントは StateStore の読み取り専用観測者であり、
//! ライフサイクルレコードには一切書き込まない。

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{LifecycleRecord, LifecycleState, RewardError, SubjectId};
use crate::ports::{
    BalanceLedger, DrawFailure, PoolStatus, PoolStatusSource, RewardDistributor, StateStore,
    StoreError,
};

/// A credited reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardGrant {
    /// Minor currency units.
    pub amount: u64,
}

pub struct RewardEligibilityGate {
    store: Arc<dyn StateStore>,
    pool: Arc<dyn PoolStatusSource>,
    distributor: Arc<dyn RewardDistributor>,
    ledger: Arc<dyn BalanceLedger>,
    provider_timeout: Duration,
}

impl RewardEligibilityGate {
    pub fn new(
        store: Arc<dyn StateStore>,
        pool: Arc<dyn PoolStatusSource>,
        distributor: Arc<dyn RewardDistributor>,
        ledger: Arc<dyn BalanceLedger>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pool,
            distributor,
            ledger,
            provider_timeout,
        }
    }

    async fn load(&self, subject_id: &SubjectId) -> Result<LifecycleRecord, RewardError> {
        match self.store.get(subject_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(id)) => Err(RewardError::NotFound(id)),
            Err(_) => Err(RewardError::Provider(
                "state is temporarily unavailable".to_string(),
            )),
        }
    }

    /// Is the subject currently allowed to grab a reward?
    ///
    /// False whenever the subject is not Active, regardless of pool status.
    pub async fn can_grab(&self, subject_id: &SubjectId) -> Result<bool, RewardError> {
        let record = self.load(subject_id).await?;
        if record.state != LifecycleState::Active {
            return Ok(false);
        }
        Ok(self.pool.pool_status().await == PoolStatus::Active)
    }

    /// Draw from the pool and credit the subject's balance.
    pub async fn grab(&self, subject_id: &SubjectId) -> Result<RewardGrant, RewardError> {
        let record = self.load(subject_id).await?;
        if record.state != LifecycleState::Active {
            return Err(RewardError::NotEligible(
                "subject has not reached the active state".to_string(),
            ));
        }
        if self.pool.pool_status().await != PoolStatus::Active {
            return Err(RewardError::NotEligible(
                "reward pool is not active".to_string(),
            ));
        }

        let draw = tokio::time::timeout(self.provider_timeout, self.distributor.draw(subject_id))
            .await
            .map_err(|_| {
                RewardError::Indeterminate("reward draw timed out; outcome unknown".to_string())
            })?
            .map_err(|e| match e {
                DrawFailure::PoolDepleted => RewardError::PoolDepleted,
                DrawFailure::Failed(reason) => RewardError::Provider(reason),
            })?;

        // from here on the amount has left the pool: any failure to credit
        // is indeterminate, not retryable (a re-draw would double-pay)
        let credited =
            tokio::time::timeout(self.provider_timeout, self.ledger.credit(subject_id, draw.amount))
                .await;
        match credited {
            Err(_) => Err(RewardError::Indeterminate(
                "ledger credit timed out after the draw".to_string(),
            )),
            Ok(Err(e)) => Err(RewardError::Indeterminate(format!(
                "reward drawn but not credited: {e}"
            ))),
            Ok(Ok(())) => {
                tracing::info!(subject = %subject_id, amount = draw.amount, "reward granted");
                Ok(RewardGrant {
                    amount: draw.amount,
                })
            }
        }
    }
}
