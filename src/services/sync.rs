use std::io::Write;
use std::sync::Arc;

use failure::Error as FailureError;
use futures::FutureExt;

use crate::microservice::*;
use crate::models::*;
use crate::services::types::ServiceFuture;

/// Outcome of replacing the destination table.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplaceReport {
    pub inserted: usize,
    pub batches: usize,
}

pub trait SyncService {
    /// Fetches the current warehouse list from WB.
    fn fetch(&self) -> ServiceFuture<'_, Vec<Warehouse>>;
    /// Clears the destination table, then inserts `warehouses` batch by batch.
    /// Nothing is rolled back when a step fails.
    fn replace(&self, warehouses: Vec<Warehouse>) -> ServiceFuture<'_, ReplaceReport>;
}

pub struct SyncServiceImpl {
    pub warehouses_microservice: Arc<dyn WarehousesMicroservice>,
    pub supabase_microservice: Arc<dyn SupabaseMicroservice>,
    pub batch_size: usize,
}

impl SyncServiceImpl {
    pub fn new(
        warehouses_microservice: Arc<dyn WarehousesMicroservice>,
        supabase_microservice: Arc<dyn SupabaseMicroservice>,
        batch_size: usize,
    ) -> Self {
        Self {
            warehouses_microservice,
            supabase_microservice,
            batch_size,
        }
    }

    async fn replace_all(&self, warehouses: Vec<Warehouse>) -> Result<ReplaceReport, FailureError> {
        self.supabase_microservice
            .delete_gte("id", 0)
            .await
            .map_err(|e| e.context("Clearing destination table failed"))?;
        info!("Destination table cleared");

        let batch_size = self.batch_size.max(1);
        let total = (warehouses.len() + batch_size - 1) / batch_size;
        for (index, batch) in warehouses.chunks(batch_size).enumerate() {
            debug!("Inserting batch {} of {} ({} rows)", index + 1, total, batch.len());
            self.supabase_microservice
                .insert(batch)
                .await
                .map_err(|e| e.context(format!("Insert batch {} of {} failed", index + 1, total)))?;
        }

        Ok(ReplaceReport {
            inserted: warehouses.len(),
            batches: total,
        })
    }
}

impl SyncService for SyncServiceImpl {
    fn fetch(&self) -> ServiceFuture<'_, Vec<Warehouse>> {
        self.warehouses_microservice.fetch_warehouses()
    }

    fn replace(&self, warehouses: Vec<Warehouse>) -> ServiceFuture<'_, ReplaceReport> {
        self.replace_all(warehouses).boxed()
    }
}

/// Runs the whole sync: fetch, report the count, replace, report completion.
/// The two report lines are the only thing written to `out`.
pub async fn run<S, W>(service: &S, out: &mut W) -> Result<ReplaceReport, FailureError>
where
    S: SyncService + ?Sized,
    W: Write,
{
    let warehouses = service.fetch().await?;
    writeln!(out, "Fetched {} warehouses from WB", warehouses.len())?;

    let report = service.replace(warehouses).await?;
    info!("Inserted {} rows in {} batches", report.inserted, report.batches);
    writeln!(out, "Sync completed")?;

    Ok(report)
}
