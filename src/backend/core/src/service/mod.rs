//! The school service: the one place that composes the evaluator, the store
//! and the credential service.
//!
//! Every operation takes the calling [`Principal`] and runs its own capability
//! gate before touching rows. Lists always go through
//! [`scope_query`](crate::rbac::scope_query).

mod accounts;
mod records;

pub use accounts::{AuthResponse, ProfileView};

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;

use crate::config::SchoolConfig;
use crate::error::{ErrorCode, Result, SchoolError};
use crate::identity::CredentialService;
use crate::rbac::{scope_query, Principal, Scoped};
use crate::school::{dashboard, DashboardData, DashboardSummary};
use crate::store::Store;

/// Facade over storage and credentials.
#[derive(Clone)]
pub struct SchoolService {
    store: Arc<dyn Store>,
    credentials: Arc<dyn CredentialService>,
    config: SchoolConfig,
}

impl SchoolService {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<dyn CredentialService>,
        config: SchoolConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &SchoolConfig {
        &self.config
    }

    /// Filter `rows` down to what `principal` may see.
    async fn scoped<T: Scoped>(&self, principal: &Principal, rows: Vec<T>) -> Result<Vec<T>> {
        let relations = self.store.relation_snapshot().await?;
        Ok(scope_query(principal, rows, &relations))
    }

    /// Role-specific counters over the caller's visible rows.
    #[instrument(skip(self, principal), fields(principal = %principal))]
    pub async fn dashboard(&self, principal: &Principal) -> Result<DashboardSummary> {
        if !principal.is_authenticated() {
            return Err(SchoolError::unauthenticated(
                "Authentication credentials were not provided",
            ));
        }

        let data = DashboardData {
            students: self.store.list_students().await?,
            teachers: self.store.list_teachers().await?,
            subjects: self.store.list_subjects().await?,
            classes: self.store.list_classes().await?,
            attendance: self.store.list_attendance().await?,
            grades: self.store.list_grades().await?,
            assignments: self.store.list_assignments().await?,
            submissions: self.store.list_submissions().await?,
            registrations: self
                .store
                .list_accounts()
                .await?
                .into_iter()
                .map(|account| account.date_joined)
                .collect(),
        };
        let relations = self.store.relation_snapshot().await?;
        let window = Duration::try_days(self.config.recent_window_days).ok_or_else(|| {
            SchoolError::with_internal(
                ErrorCode::ConfigurationError,
                "Invalid configuration",
                format!("recent_window_days out of range: {}", self.config.recent_window_days),
            )
        })?;

        dashboard::summarize(
            principal,
            data,
            &relations,
            Utc::now(),
            window,
        )
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }
}
