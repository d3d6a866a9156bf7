/// Postgres sink: batched inserts inside one transaction per symbol
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use crate::error::Result;
use crate::sink::{RecordSink, SinkReport};
use crate::types::{CanonicalRecord, Granularity};

/// Rows per INSERT statement, kept well under the bind-parameter limit
const INSERT_CHUNK: usize = 1000;

pub struct PostgresSink {
    pool: PgPool,
    dry_run: bool,
}

impl PostgresSink {
    pub async fn connect(database_url: &str, dry_run: bool) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        Ok(PostgresSink { pool, dry_run })
    }

    pub fn new(pool: PgPool, dry_run: bool) -> Self {
        PostgresSink { pool, dry_run }
    }

    fn table_name(symbol: &str, granularity: Granularity) -> String {
        format!("{}_{}", symbol.to_lowercase(), granularity.as_str())
    }
}

#[async_trait]
impl RecordSink for PostgresSink {
    async fn write(
        &self,
        symbol: &str,
        granularity: Granularity,
        records: &[CanonicalRecord],
    ) -> Result<SinkReport> {
        let table = Self::table_name(symbol, granularity);
        let columns = match granularity {
            Granularity::Daily => {
                "record_id, coin_symbol, date, open, low, high, close, \
                 trade_vol_native, trade_vol_usd"
            }
            Granularity::Hourly => {
                "record_id, coin_symbol, date, hour, open, low, high, close, \
                 trade_vol_native, trade_vol_usd"
            }
        };

        // Any insert error propagates here and the dropped transaction
        // rolls back: a failed symbol leaves no rows behind.
        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, columns));

            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.record_id)
                    .push_bind(&record.coin_symbol)
                    .push_bind(&record.date);
                if granularity == Granularity::Hourly {
                    b.push_bind(record.hour.as_deref().unwrap_or(""));
                }
                b.push_bind(record.open)
                    .push_bind(record.low)
                    .push_bind(record.high)
                    .push_bind(record.close)
                    .push_bind(record.trade_vol_native)
                    .push_bind(record.trade_vol_usd);
            });

            builder.build().execute(&mut *tx).await?;
        }

        if self.dry_run {
            tx.rollback().await?;
            info!(symbol, table = %table, rows = records.len(), "dry run: transaction rolled back");
            return Ok(SinkReport {
                destination: table,
                rows: records.len(),
                committed: false,
            });
        }

        tx.commit().await?;
        info!(symbol, table = %table, rows = records.len(), "rows committed");
        Ok(SinkReport {
            destination: table,
            rows: records.len(),
            committed: true,
        })
    }
}
