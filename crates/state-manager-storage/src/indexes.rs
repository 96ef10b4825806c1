//! Lifecycle: index creation (component J, spec.md §6 "Persisted state
//! layout"). Grounded on `everruns-durable`'s persistence migration
//! comments and `original_source`'s Beanie `Settings.indexes` declarations,
//! re-pointed at the raw `mongodb` driver since this crate talks to Mongo
//! directly rather than through an ODM.

use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};

use crate::error::StoreError;
use crate::mongo::collection_names;

/// Create every unique/TTL/secondary index spec.md §6 requires. Idempotent:
/// safe to call on every startup (`create_index` on an index that already
/// exists with identical options is a no-op).
///
/// `run_ttl_days` is the configurable retention behind the `RUN_TTL_DAYS`
/// setting: runs (and, per spec.md §3, their states) age out `run_ttl_days`
/// after `created_at`, not at `created_at` itself.
pub async fn ensure_indexes(db: &Database, run_ttl_days: u32) -> Result<(), StoreError> {
    ensure_graph_template_indexes(db).await?;
    ensure_registered_node_indexes(db).await?;
    ensure_run_indexes(db, run_ttl_days).await?;
    ensure_trigger_indexes(db).await?;
    ensure_state_indexes(db, run_ttl_days).await?;
    Ok(())
}

async fn ensure_graph_template_indexes(db: &Database) -> Result<(), StoreError> {
    let collection = db.collection::<mongodb::bson::Document>(collection_names::GRAPH_TEMPLATES);
    let index = IndexModel::builder()
        .keys(doc! { "namespace": 1, "name": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    collection.create_index(index).await?;
    Ok(())
}

async fn ensure_registered_node_indexes(db: &Database) -> Result<(), StoreError> {
    let collection = db.collection::<mongodb::bson::Document>(collection_names::REGISTERED_NODES);
    let index = IndexModel::builder()
        .keys(doc! { "namespace": 1, "name": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    collection.create_index(index).await?;
    Ok(())
}

async fn ensure_run_indexes(db: &Database, run_ttl_days: u32) -> Result<(), StoreError> {
    let collection = db.collection::<mongodb::bson::Document>(collection_names::RUNS);

    let unique_run_id = IndexModel::builder()
        .keys(doc! { "run_id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    collection.create_index(unique_run_id).await?;

    let ttl = IndexModel::builder()
        .keys(doc! { "created_at": 1 })
        .options(
            IndexOptions::builder()
                .expire_after(Some(std::time::Duration::from_secs(
                    run_ttl_days as u64 * 86_400,
                )))
                .build(),
        )
        .build();
    collection.create_index(ttl).await?;
    Ok(())
}

async fn ensure_trigger_indexes(db: &Database) -> Result<(), StoreError> {
    let collection = db.collection::<mongodb::bson::Document>(collection_names::TRIGGERS);

    let unique = IndexModel::builder()
        .keys(doc! {
            "type": 1,
            "expression": 1,
            "graph_name": 1,
            "namespace": 1,
            "trigger_time": 1,
        })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    collection.create_index(unique).await?;

    let ttl = IndexModel::builder()
        .keys(doc! { "expires_at": 1 })
        .options(
            IndexOptions::builder()
                .expire_after(Some(std::time::Duration::from_secs(0)))
                .build(),
        )
        .build();
    collection.create_index(ttl).await?;
    Ok(())
}

async fn ensure_state_indexes(db: &Database, run_ttl_days: u32) -> Result<(), StoreError> {
    let collection = db.collection::<mongodb::bson::Document>(collection_names::STATES);

    let natural_key = IndexModel::builder()
        .keys(doc! { "run_id": 1, "identifier": 1, "fanout_id": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    collection.create_index(natural_key).await?;

    // spec.md §3 "Runs and States share the same TTL retention regime":
    // states age out `run_ttl_days` after their own `created_at`, same
    // retention window as their owning run.
    let ttl = IndexModel::builder()
        .keys(doc! { "created_at": 1 })
        .options(
            IndexOptions::builder()
                .expire_after(Some(std::time::Duration::from_secs(
                    run_ttl_days as u64 * 86_400,
                )))
                .build(),
        )
        .build();
    collection.create_index(ttl).await?;

    // Claim path: status + enqueue_after (spec.md §6).
    let claim_path = IndexModel::builder()
        .keys(doc! { "status": 1, "enqueue_after": 1 })
        .build();
    collection.create_index(claim_path).await?;

    // Timeout sweeper: status + queued_at.
    let timeout_path = IndexModel::builder()
        .keys(doc! { "status": 1, "queued_at": 1 })
        .build();
    collection.create_index(timeout_path).await?;

    // Join-check query (§4.5 step 3a): identifier + parents lookups + run.
    let join_check = IndexModel::builder()
        .keys(doc! { "namespace": 1, "graph_name": 1, "identifier": 1, "status": 1 })
        .build();
    collection.create_index(join_check).await?;

    Ok(())
}
