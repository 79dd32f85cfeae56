use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortfolioError {
    #[error("asset {0} not found")]
    NotFound(Uuid),
}

/// A stored portfolio position. Row shape mirrors the `crypto_portfolio`
/// table the dashboard reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRow {
    pub id: Uuid,
    pub user_id: String,
    pub code: String,
    pub name: String,
    pub amount: f64,
    pub avg_price_usd: f64,
    pub updated_at: DateTime<Utc>,
}

/// User-supplied asset fields, from the add/edit forms or the chat tools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetDraft {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub avg_price_usd: f64,
}

impl AssetDraft {
    fn normalized(mut self) -> Self {
        self.code = self.code.trim().to_uppercase();
        self.name = self.name.trim().to_string();
        for value in [&mut self.amount, &mut self.avg_price_usd] {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        self
    }
}

/// Narrow persistence seam. Every operation is scoped by the opaque
/// authenticated user id; rows of other users are invisible.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<AssetRow>>;
    async fn insert(&self, user_id: &str, draft: AssetDraft) -> Result<AssetRow>;
    async fn update(&self, id: Uuid, user_id: &str, draft: AssetDraft) -> Result<AssetRow>;
    async fn delete(&self, id: Uuid, user_id: &str) -> Result<()>;
    /// Inserts, or updates the caller's existing row with the same code.
    async fn upsert(&self, user_id: &str, draft: AssetDraft) -> Result<AssetRow>;
}

/// In-memory store. Durable persistence lives behind the hosted database
/// this service fronts; this keeps the same interface for the API and tests.
#[derive(Debug, Default)]
pub struct MemoryPortfolioStore {
    rows: RwLock<Vec<AssetRow>>,
}

impl MemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortfolioStore for MemoryPortfolioStore {
    async fn list(&self, user_id: &str) -> Result<Vec<AssetRow>> {
        let rows = self.rows.read().await;
        let mut owned: Vec<AssetRow> = rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned)
    }

    async fn insert(&self, user_id: &str, draft: AssetDraft) -> Result<AssetRow> {
        let draft = draft.normalized();
        let row = AssetRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            code: draft.code,
            name: draft.name,
            amount: draft.amount,
            avg_price_usd: draft.avg_price_usd,
            updated_at: Utc::now(),
        };
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: Uuid, user_id: &str, draft: AssetDraft) -> Result<AssetRow> {
        let draft = draft.normalized();
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id && row.user_id == user_id)
            .ok_or(PortfolioError::NotFound(id))?;

        row.code = draft.code;
        row.name = draft.name;
        row.amount = draft.amount;
        row.avg_price_usd = draft.avg_price_usd;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !(row.id == id && row.user_id == user_id));
        if rows.len() == before {
            return Err(PortfolioError::NotFound(id));
        }
        Ok(())
    }

    async fn upsert(&self, user_id: &str, draft: AssetDraft) -> Result<AssetRow> {
        let draft = draft.normalized();
        let existing = {
            let rows = self.rows.read().await;
            rows.iter()
                .find(|row| row.user_id == user_id && row.code == draft.code)
                .map(|row| row.id)
        };
        match existing {
            Some(id) => self.update(id, user_id, draft).await,
            None => self.insert(user_id, draft).await,
        }
    }
}

/// A row joined with its live market quote, as the dashboard table shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedAsset {
    #[serde(flatten)]
    pub row: AssetRow,
    pub current_price_usd: Option<f64>,
    pub current_value_usd: Option<f64>,
    pub pl_usd: Option<f64>,
    pub pl_percent: Option<f64>,
}

/// Joins rows with a symbol-keyed USD price map. Rows without a quote keep
/// `None` valuation fields; a zero cost basis reports 0% P/L.
pub fn valuations(rows: &[AssetRow], prices: &HashMap<String, f64>) -> Vec<ValuedAsset> {
    rows.iter()
        .map(|row| {
            let current_price_usd = prices.get(&row.code).copied();
            let current_value_usd = current_price_usd.map(|price| price * row.amount);
            let pl_usd = current_value_usd.map(|value| value - row.amount * row.avg_price_usd);
            let pl_percent = pl_usd.map(|pl| {
                let cost = row.amount * row.avg_price_usd;
                if cost == 0.0 { 0.0 } else { pl / cost * 100.0 }
            });
            ValuedAsset {
                row: row.clone(),
                current_price_usd,
                current_value_usd,
                pl_usd,
                pl_percent,
            }
        })
        .collect()
}
