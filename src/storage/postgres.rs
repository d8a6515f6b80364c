//! PostgreSQL store
//!
//! Each unit of work is one `sqlx` transaction. Structured entity fields
//! (policies, instance lists, host and path lists) are kept in JSONB columns;
//! the LB matrix is kept as the JSON text it is exported as.

use super::pool::DbPool;
use super::traits::*;
use crate::domain::{
    AdvancedRule, BasicRule, BfeCluster, BfeClusterId, Certificate, CertificateId, ClusterBasic,
    ClusterId, ClusterRecord, ConfigVersion, Domain, DomainId, Instance, LbMatrix,
    PassiveHealthCheck, Pool, PoolId, PoolTag, PoolType, Product, ProductId, ProductRouteRule,
    StickySessions, SubClusterId, SubClusterRecord,
};
use crate::errors::{Result, SwitchyardError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::BTreeMap;
use tracing::instrument;

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(|e| {
            SwitchyardError::storage(e, "Failed to begin transaction")
        })?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// Unit of work over a [`PgStore`]. Dropping it rolls the transaction back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            SwitchyardError::storage(e, "Failed to commit transaction")
        })
    }
}

fn ids_to_i64<T: Copy + Into<i64>>(ids: &[T]) -> Vec<i64> {
    ids.iter().map(|id| (*id).into()).collect()
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    mail_list: Json<Vec<String>>,
    contact: Json<Vec<String>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            mail_list: row.mail_list.0,
            contact: row.contact.0,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct PoolRow {
    id: PoolId,
    name: String,
    product_id: ProductId,
    tag: String,
    pool_type: String,
    instances: Json<Vec<Instance>>,
}

impl TryFrom<PoolRow> for Pool {
    type Error = SwitchyardError;

    fn try_from(row: PoolRow) -> Result<Self> {
        let tag = PoolTag::parse(&row.tag)
            .ok_or_else(|| {
                SwitchyardError::dirty(format!("Pool '{}' has unknown tag '{}'", row.name, row.tag))
            })?;
        let pool_type = PoolType::parse(&row.pool_type)
            .ok_or_else(|| {
                SwitchyardError::dirty(format!(
                    "Pool '{}' has unknown type '{}'",
                    row.name,
                    row.pool_type
                ))
            })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            product_id: row.product_id,
            tag,
            pool_type,
            instances: row.instances.0,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct BfeClusterRow {
    id: BfeClusterId,
    name: String,
    pool_id: PoolId,
    capacity: i64,
    enabled: bool,
}

impl From<BfeClusterRow> for BfeCluster {
    fn from(row: BfeClusterRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            pool_id: row.pool_id,
            capacity: row.capacity,
            enabled: row.enabled,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct SubClusterRow {
    id: SubClusterId,
    name: String,
    product_id: ProductId,
    description: String,
    pool_id: PoolId,
    cluster_id: Option<ClusterId>,
}

impl From<SubClusterRow> for SubClusterRecord {
    fn from(row: SubClusterRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            product_id: row.product_id,
            description: row.description,
            pool_id: row.pool_id,
            cluster_id: row.cluster_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ClusterRow {
    id: ClusterId,
    name: String,
    product_id: ProductId,
    description: String,
    basic: Json<ClusterBasic>,
    sticky_sessions: Json<StickySessions>,
    passive_health_check: Json<PassiveHealthCheck>,
}

impl From<ClusterRow> for ClusterRecord {
    fn from(row: ClusterRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            product_id: row.product_id,
            description: row.description,
            basic: row.basic.0,
            sticky_sessions: row.sticky_sessions.0,
            passive_health_check: row.passive_health_check.0,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct DomainRow {
    id: DomainId,
    name: String,
    product_id: ProductId,
    using_advanced_redirect: bool,
    using_advanced_hsts: bool,
}

impl From<DomainRow> for Domain {
    fn from(row: DomainRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            product_id: row.product_id,
            using_advanced_redirect: row.using_advanced_redirect,
            using_advanced_hsts: row.using_advanced_hsts,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct BasicRuleRow {
    product_id: ProductId,
    host_names: Json<Vec<String>>,
    paths: Json<Vec<String>>,
    cluster_id: Option<ClusterId>,
    cluster_name: String,
    description: String,
}

#[derive(Debug, Clone, FromRow)]
struct AdvancedRuleRow {
    product_id: ProductId,
    name: String,
    expression: String,
    cluster_id: Option<ClusterId>,
    cluster_name: String,
    description: String,
}

#[derive(Debug, Clone, FromRow)]
struct CertificateRow {
    id: CertificateId,
    name: String,
    description: String,
    is_default: bool,
    cert_file_path: String,
    key_file_path: String,
    expired_date: String,
}

impl From<CertificateRow> for Certificate {
    fn from(row: CertificateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            is_default: row.is_default,
            cert_file_path: row.cert_file_path,
            key_file_path: row.key_file_path,
            expired_date: row.expired_date,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ConfigVersionRow {
    topic: String,
    signature: String,
    version: String,
    created_at: DateTime<Utc>,
}

impl From<ConfigVersionRow> for ConfigVersion {
    fn from(row: ConfigVersionRow) -> Self {
        Self {
            topic: row.topic,
            signature: row.signature,
            version: row.version,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

const PRODUCT_COLUMNS: &str = "id, name, description, mail_list, contact";

#[async_trait]
impl ProductStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_products")]
    async fn fetch_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE ($1::BIGINT IS NULL OR id = $1) \
             AND ($2::TEXT IS NULL OR name = $2) ORDER BY name",
            PRODUCT_COLUMNS
        ))
        .bind(filter.id)
        .bind(filter.name.as_deref())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch products"))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(
        skip(self, product),
        fields(product_name = %product.name),
        name = "db_create_product"
    )]
    async fn create_product(&mut self, product: &NewProduct) -> Result<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (name, description, mail_list, contact) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(Json(&product.mail_list))
        .bind(Json(&product.contact))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to create product '{}'", product.name))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), name = "db_update_product")]
    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, mail_list = $4, contact = $5, \
             updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(Json(&product.mail_list))
        .bind(Json(&product.contact))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to update product {}", product.id))
        })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Product", product.id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_product")]
    async fn delete_product(&mut self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to delete product {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Product", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

const POOL_COLUMNS: &str = "id, name, product_id, tag, pool_type, instances";

#[async_trait]
impl PoolStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_pools")]
    async fn fetch_pools(&mut self, filter: &PoolFilter) -> Result<Vec<Pool>> {
        let rows = sqlx::query_as::<_, PoolRow>(&format!(
            "SELECT {} FROM pools \
             WHERE ($1::BIGINT IS NULL OR id = $1) \
               AND ($2::BIGINT[] IS NULL OR id = ANY($2)) \
               AND ($3::TEXT IS NULL OR name = $3) \
               AND ($4::BIGINT IS NULL OR product_id = $4) \
             ORDER BY name",
            POOL_COLUMNS
        ))
        .bind(filter.id)
        .bind(filter.ids.as_deref().map(ids_to_i64))
        .bind(filter.name.as_deref())
        .bind(filter.product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch pools"))?;

        rows.into_iter().map(Pool::try_from).collect()
    }

    #[instrument(skip(self, pool), fields(pool_name = %pool.name), name = "db_create_pool")]
    async fn create_pool(&mut self, pool: &NewPool) -> Result<Pool> {
        let row = sqlx::query_as::<_, PoolRow>(&format!(
            "INSERT INTO pools (name, product_id, tag, pool_type, instances) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            POOL_COLUMNS
        ))
        .bind(&pool.name)
        .bind(pool.product_id)
        .bind(pool.tag.as_str())
        .bind(pool.pool_type.as_str())
        .bind(Json(&pool.instances))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to create pool '{}'", pool.name))
        })?;

        Pool::try_from(row)
    }

    #[instrument(
        skip(self, instances),
        fields(instance_count = instances.len()),
        name = "db_update_pool_instances"
    )]
    async fn update_pool_instances(&mut self, id: PoolId, instances: &[Instance]) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pools SET instances = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(Json(instances))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to update instances of pool {}", id))
        })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Pool", id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_pool")]
    async fn delete_pool(&mut self, id: PoolId) -> Result<()> {
        let result = sqlx::query("DELETE FROM pools WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to delete pool {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Pool", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BFE clusters
// ---------------------------------------------------------------------------

const BFE_CLUSTER_COLUMNS: &str = "id, name, pool_id, capacity, enabled";

#[async_trait]
impl BfeClusterStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_bfe_clusters")]
    async fn fetch_bfe_clusters(&mut self, filter: &BfeClusterFilter) -> Result<Vec<BfeCluster>> {
        let rows = sqlx::query_as::<_, BfeClusterRow>(&format!(
            "SELECT {} FROM bfe_clusters WHERE ($1::TEXT IS NULL OR name = $1) \
             AND ($2::BIGINT IS NULL OR pool_id = $2) ORDER BY name",
            BFE_CLUSTER_COLUMNS
        ))
        .bind(filter.name.as_deref())
        .bind(filter.pool_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch BFE clusters"))?;

        Ok(rows.into_iter().map(BfeCluster::from).collect())
    }

    #[instrument(
        skip(self, bfe_cluster),
        fields(bfe_cluster_name = %bfe_cluster.name),
        name = "db_create_bfe_cluster"
    )]
    async fn create_bfe_cluster(&mut self, bfe_cluster: &NewBfeCluster) -> Result<BfeCluster> {
        let row = sqlx::query_as::<_, BfeClusterRow>(&format!(
            "INSERT INTO bfe_clusters (name, pool_id, capacity, enabled) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            BFE_CLUSTER_COLUMNS
        ))
        .bind(&bfe_cluster.name)
        .bind(bfe_cluster.pool_id)
        .bind(bfe_cluster.capacity)
        .bind(bfe_cluster.enabled)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to create BFE cluster '{}'", bfe_cluster.name),
            )
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self), name = "db_delete_bfe_cluster")]
    async fn delete_bfe_cluster(&mut self, id: BfeClusterId) -> Result<()> {
        let result = sqlx::query("DELETE FROM bfe_clusters WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(e, format!("Failed to delete BFE cluster {}", id))
            })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("BfeCluster", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-clusters
// ---------------------------------------------------------------------------

const SUB_CLUSTER_COLUMNS: &str = "id, name, product_id, description, pool_id, cluster_id";

#[async_trait]
impl SubClusterStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_sub_clusters")]
    async fn fetch_sub_clusters(
        &mut self,
        filter: &SubClusterFilter,
    ) -> Result<Vec<SubClusterRecord>> {
        let rows = sqlx::query_as::<_, SubClusterRow>(&format!(
            "SELECT {} FROM sub_clusters \
             WHERE ($1::BIGINT IS NULL OR id = $1) \
               AND ($2::BIGINT IS NULL OR product_id = $2) \
               AND ($3::TEXT[] IS NULL OR name = ANY($3)) \
               AND ($4::BIGINT IS NULL OR cluster_id = $4) \
               AND ($5::BIGINT IS NULL OR pool_id = $5) \
             ORDER BY name",
            SUB_CLUSTER_COLUMNS
        ))
        .bind(filter.id)
        .bind(filter.product_id)
        .bind(filter.names.as_deref())
        .bind(filter.cluster_id)
        .bind(filter.pool_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch sub clusters"))?;

        Ok(rows.into_iter().map(SubClusterRecord::from).collect())
    }

    #[instrument(
        skip(self, sub_cluster),
        fields(sub_cluster_name = %sub_cluster.name),
        name = "db_create_sub_cluster"
    )]
    async fn create_sub_cluster(
        &mut self,
        sub_cluster: &NewSubCluster,
    ) -> Result<SubClusterRecord> {
        let row = sqlx::query_as::<_, SubClusterRow>(&format!(
            "INSERT INTO sub_clusters (name, product_id, description, pool_id) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            SUB_CLUSTER_COLUMNS
        ))
        .bind(&sub_cluster.name)
        .bind(sub_cluster.product_id)
        .bind(&sub_cluster.description)
        .bind(sub_cluster.pool_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to create sub cluster '{}'", sub_cluster.name),
            )
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self), name = "db_update_sub_cluster")]
    async fn update_sub_cluster(
        &mut self,
        id: SubClusterId,
        update: &SubClusterUpdate,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE sub_clusters \
             SET pool_id = COALESCE($2, pool_id), description = COALESCE($3, description), \
             updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(id)
        .bind(update.pool_id)
        .bind(update.description.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, format!("Failed to update sub cluster {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("SubCluster", id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_sub_cluster")]
    async fn delete_sub_cluster(&mut self, id: SubClusterId) -> Result<()> {
        let result = sqlx::query("DELETE FROM sub_clusters WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(e, format!("Failed to delete sub cluster {}", id))
            })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("SubCluster", id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_bind_sub_clusters")]
    async fn bind_sub_clusters(
        &mut self,
        cluster_id: ClusterId,
        ids: &[SubClusterId],
    ) -> Result<()> {
        // A concurrent writer may have mounted one of them after it was read
        let result = sqlx::query(
            "UPDATE sub_clusters SET cluster_id = $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ANY($2) AND cluster_id IS NULL",
        )
        .bind(cluster_id)
        .bind(ids_to_i64(ids))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
            e,
            format!("Failed to bind sub clusters to cluster {}", cluster_id),
            )
        })?;

        if result.rows_affected() != ids.len() as u64 {
            return Err(SwitchyardError::model(format!(
                "Only {} of {} sub clusters could be mounted to cluster {}; the rest are missing \
                 or already mounted",
                result.rows_affected(),
                ids.len(),
                cluster_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_unbind_sub_clusters")]
    async fn unbind_sub_clusters(&mut self, ids: &[SubClusterId]) -> Result<()> {
        sqlx::query(
            "UPDATE sub_clusters SET cluster_id = NULL, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ANY($1)",
        )
        .bind(ids_to_i64(ids))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to unbind sub clusters"))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clusters
// ---------------------------------------------------------------------------

const CLUSTER_COLUMNS: &str =
    "id, name, product_id, description, basic, sticky_sessions, passive_health_check";

#[async_trait]
impl ClusterStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_clusters")]
    async fn fetch_clusters(&mut self, filter: &ClusterFilter) -> Result<Vec<ClusterRecord>> {
        let rows = sqlx::query_as::<_, ClusterRow>(&format!(
            "SELECT {} FROM clusters \
             WHERE ($1::BIGINT IS NULL OR id = $1) \
               AND ($2::TEXT IS NULL OR name = $2) \
               AND ($3::BIGINT IS NULL OR product_id = $3) \
             ORDER BY name",
            CLUSTER_COLUMNS
        ))
        .bind(filter.id)
        .bind(filter.name.as_deref())
        .bind(filter.product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch clusters"))?;

        Ok(rows.into_iter().map(ClusterRecord::from).collect())
    }

    #[instrument(
        skip(self, cluster),
        fields(cluster_name = %cluster.name),
        name = "db_create_cluster"
    )]
    async fn create_cluster(&mut self, cluster: &NewCluster) -> Result<ClusterRecord> {
        let row = sqlx::query_as::<_, ClusterRow>(&format!(
            "INSERT INTO clusters (name, product_id, description, basic, sticky_sessions, \
             passive_health_check) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            CLUSTER_COLUMNS
        ))
        .bind(&cluster.name)
        .bind(cluster.product_id)
        .bind(&cluster.description)
        .bind(Json(&cluster.basic))
        .bind(Json(&cluster.sticky_sessions))
        .bind(Json(&cluster.passive_health_check))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to create cluster '{}'", cluster.name))
        })?;

        Ok(row.into())
    }

    #[instrument(
        skip(self, cluster),
        fields(cluster_id = %cluster.id, cluster_name = %cluster.name),
        name = "db_update_cluster"
    )]
    async fn update_cluster(&mut self, cluster: &ClusterRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE clusters SET description = $2, basic = $3, sticky_sessions = $4, \
             passive_health_check = $5, \
             updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(cluster.id)
        .bind(&cluster.description)
        .bind(Json(&cluster.basic))
        .bind(Json(&cluster.sticky_sessions))
        .bind(Json(&cluster.passive_health_check))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to update cluster '{}'", cluster.name))
        })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Cluster", cluster.id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_cluster")]
    async fn delete_cluster(&mut self, id: ClusterId) -> Result<()> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to delete cluster {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Cluster", id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_lock_cluster")]
    async fn lock_cluster(&mut self, id: ClusterId) -> Result<()> {
        sqlx::query("SELECT id FROM clusters WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to lock cluster {}", id)))?
            .ok_or_else(|| SwitchyardError::not_exist("Cluster", id))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LB matrices
// ---------------------------------------------------------------------------

#[async_trait]
impl LbMatrixStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_lb_matrix")]
    async fn fetch_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<Option<LbMatrix>> {
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT lb_matrix FROM lb_matrices WHERE cluster_id = $1",
        )
        .bind(cluster_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to fetch LB matrix of cluster {}", cluster_id),
            )
        })?;

        raw.as_deref().map(LbMatrix::parse_stored).transpose()
    }

    #[instrument(skip(self, matrix), name = "db_upsert_lb_matrix")]
    async fn upsert_lb_matrix(
        &mut self,
        cluster_id: ClusterId,
        product_id: ProductId,
        matrix: &LbMatrix,
    ) -> Result<()> {
        let raw = serde_json::to_string(matrix)?;

        sqlx::query(
            "INSERT INTO lb_matrices (cluster_id, product_id, lb_matrix) VALUES ($1, $2, $3) \
             ON CONFLICT (cluster_id) DO UPDATE SET product_id = EXCLUDED.product_id, \
             lb_matrix = EXCLUDED.lb_matrix, \
             updated_at = CURRENT_TIMESTAMP",
        )
        .bind(cluster_id)
        .bind(product_id)
        .bind(raw)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
            e,
            format!("Failed to store LB matrix of cluster {}", cluster_id),
            )
        })?;

        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_lb_matrix")]
    async fn delete_lb_matrix(&mut self, cluster_id: ClusterId) -> Result<()> {
        sqlx::query("DELETE FROM lb_matrices WHERE cluster_id = $1")
            .bind(cluster_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(
                    e,
                    format!("Failed to delete LB matrix of cluster {}", cluster_id),
                )
            })?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

const DOMAIN_COLUMNS: &str = "id, name, product_id, using_advanced_redirect, using_advanced_hsts";

#[async_trait]
impl DomainStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_domains")]
    async fn fetch_domains(&mut self, filter: &DomainFilter) -> Result<Vec<Domain>> {
        let rows = sqlx::query_as::<_, DomainRow>(&format!(
            "SELECT {} FROM domains WHERE ($1::BIGINT IS NULL OR product_id = $1) \
             AND ($2::TEXT IS NULL OR name = $2) ORDER BY name",
            DOMAIN_COLUMNS
        ))
        .bind(filter.product_id)
        .bind(filter.name.as_deref())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch domains"))?;

        Ok(rows.into_iter().map(Domain::from).collect())
    }

    #[instrument(skip(self, domain), fields(domain_name = %domain.name), name = "db_create_domain")]
    async fn create_domain(&mut self, domain: &NewDomain) -> Result<Domain> {
        let row = sqlx::query_as::<_, DomainRow>(&format!(
            "INSERT INTO domains (name, product_id, using_advanced_redirect, using_advanced_hsts) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            DOMAIN_COLUMNS
        ))
        .bind(&domain.name)
        .bind(domain.product_id)
        .bind(domain.using_advanced_redirect)
        .bind(domain.using_advanced_hsts)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to create domain '{}'", domain.name))
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self), name = "db_delete_domain")]
    async fn delete_domain(&mut self, id: DomainId) -> Result<()> {
        let result = sqlx::query("DELETE FROM domains WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to delete domain {}", id)))?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Domain", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Route rules
// ---------------------------------------------------------------------------

#[async_trait]
impl RouteRuleStore for PgTx {
    #[instrument(skip(self), name = "db_lock_advanced_rules")]
    async fn lock_advanced_rules(&mut self, product_id: ProductId) -> Result<()> {
        // The product row serializes writers even when no rule rows exist yet
        sqlx::query("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(e, format!("Failed to lock product {}", product_id))
            })?;

        sqlx::query("SELECT id FROM advanced_route_rules WHERE product_id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(
                    e,
                    format!("Failed to lock advanced rules of product {}", product_id),
                )
            })?;

        Ok(())
    }

    #[instrument(skip(self), name = "db_fetch_route_rules")]
    async fn fetch_route_rules(
        &mut self,
        product_id: Option<ProductId>,
    ) -> Result<BTreeMap<ProductId, ProductRouteRule>> {
        let basic_rows = sqlx::query_as::<_, BasicRuleRow>(
            "SELECT product_id, host_names, paths, cluster_id, cluster_name, description \
             FROM basic_route_rules \
             WHERE ($1::BIGINT IS NULL OR product_id = $1) ORDER BY product_id, position",
        )
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch basic route rules"))?;

        let advanced_rows = sqlx::query_as::<_, AdvancedRuleRow>(
            "SELECT product_id, name, expression, cluster_id, cluster_name, description \
             FROM advanced_route_rules \
             WHERE ($1::BIGINT IS NULL OR product_id = $1) ORDER BY product_id, position",
        )
        .bind(product_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch advanced route rules"))?;

        let mut rules: BTreeMap<ProductId, ProductRouteRule> = BTreeMap::new();
        for row in basic_rows {
            rules.entry(row.product_id).or_default().basic_rules.push(BasicRule {
                host_names: row.host_names.0,
                paths: row.paths.0,
                cluster_name: row.cluster_name,
                cluster_id: row.cluster_id,
                description: row.description,
            });
        }
        for row in advanced_rows {
            rules.entry(row.product_id).or_default().advanced_rules.push(AdvancedRule {
                name: row.name,
                expression: row.expression,
                cluster_name: row.cluster_name,
                cluster_id: row.cluster_id,
                description: row.description,
            });
        }

        Ok(rules)
    }

    #[instrument(skip(self), name = "db_delete_route_rules")]
    async fn delete_route_rules(&mut self, product_id: ProductId) -> Result<()> {
        sqlx::query("DELETE FROM basic_route_rules WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(
                    e,
                    format!("Failed to delete basic rules of product {}", product_id),
                )
            })?;

        sqlx::query("DELETE FROM advanced_route_rules WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(
                    e,
                    format!("Failed to delete advanced rules of product {}", product_id),
                )
            })?;

        Ok(())
    }

    #[instrument(
        skip(self, rules),
        fields(basic = rules.basic_rules.len(), advanced = rules.advanced_rules.len()),
        name = "db_create_route_rules"
    )]
    async fn create_route_rules(
        &mut self,
        product_id: ProductId,
        rules: &ProductRouteRule,
    ) -> Result<()> {
        for (position, rule) in rules.basic_rules.iter().enumerate() {
            sqlx::query(
                "INSERT INTO basic_route_rules (product_id, position, host_names, paths, \
                 cluster_id, cluster_name, description) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(product_id)
            .bind(position as i32)
            .bind(Json(&rule.host_names))
            .bind(Json(&rule.paths))
            .bind(rule.cluster_id)
            .bind(&rule.cluster_name)
            .bind(&rule.description)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(
                e,
                format!("Failed to insert basic rule of product {}", product_id),
                )
            })?;
        }

        for (position, rule) in rules.advanced_rules.iter().enumerate() {
            sqlx::query(
                "INSERT INTO advanced_route_rules (product_id, position, name, expression, \
                 cluster_id, cluster_name, description) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(product_id)
            .bind(position as i32)
            .bind(&rule.name)
            .bind(&rule.expression)
            .bind(rule.cluster_id)
            .bind(&rule.cluster_name)
            .bind(&rule.description)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                let context = format!(
                "Failed to insert advanced rule '{}' of product {}",
                rule.name, product_id
                );
                SwitchyardError::storage(e, context)
            })?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

const CERTIFICATE_COLUMNS: &str =
    "id, name, description, is_default, cert_file_path, key_file_path, expired_date";

#[async_trait]
impl CertificateStore for PgTx {
    #[instrument(skip(self), name = "db_fetch_certificates")]
    async fn fetch_certificates(&mut self, filter: &CertificateFilter) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {} FROM certificates WHERE ($1::TEXT IS NULL OR name = $1) \
             AND ($2::BOOLEAN IS NULL OR is_default = $2) ORDER BY name",
            CERTIFICATE_COLUMNS
        ))
        .bind(filter.name.as_deref())
        .bind(filter.is_default)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| SwitchyardError::storage(e, "Failed to fetch certificates"))?;

        Ok(rows.into_iter().map(Certificate::from).collect())
    }

    #[instrument(
        skip(self, certificate),
        fields(certificate_name = %certificate.name),
        name = "db_create_certificate"
    )]
    async fn create_certificate(&mut self, certificate: &NewCertificate) -> Result<Certificate> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "INSERT INTO certificates (name, description, is_default, cert_file_path, \
             key_file_path, expired_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            CERTIFICATE_COLUMNS
        ))
        .bind(&certificate.name)
        .bind(&certificate.description)
        .bind(certificate.is_default)
        .bind(&certificate.cert_file_path)
        .bind(&certificate.key_file_path)
        .bind(&certificate.expired_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to create certificate '{}'", certificate.name),
            )
        })?;

        Ok(row.into())
    }

    #[instrument(skip(self), name = "db_set_default_certificate")]
    async fn set_default_certificate(&mut self, id: CertificateId) -> Result<()> {
        // Clear first: at most one row may carry the flag at any time
        sqlx::query("UPDATE certificates SET is_default = FALSE WHERE is_default AND id <> $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, "Failed to clear default certificate"))?;

        let result = sqlx::query("UPDATE certificates SET is_default = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(e, format!("Failed to set default certificate {}", id))
            })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Certificate", id));
        }
        Ok(())
    }

    #[instrument(skip(self), name = "db_delete_certificate")]
    async fn delete_certificate(&mut self, id: CertificateId) -> Result<()> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                SwitchyardError::storage(e, format!("Failed to delete certificate {}", id))
            })?;

        if result.rows_affected() == 0 {
            return Err(SwitchyardError::not_exist("Certificate", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config version ledger
// ---------------------------------------------------------------------------

#[async_trait]
impl ConfigVersionStore for PgTx {
    #[instrument(skip(self), name = "db_lock_topic")]
    async fn lock_topic(&mut self, topic: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(topic)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| SwitchyardError::storage(e, format!("Failed to lock topic '{}'", topic)))?;

        Ok(())
    }

    #[instrument(skip(self), name = "db_latest_config_version")]
    async fn latest_config_version(&mut self, topic: &str) -> Result<Option<ConfigVersion>> {
        let row = sqlx::query_as::<_, ConfigVersionRow>(
            "SELECT topic, signature, version, created_at FROM config_versions \
             WHERE topic = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(topic)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to fetch latest version of topic '{}'", topic),
            )
        })?;

        Ok(row.map(ConfigVersion::from))
    }

    #[instrument(skip(self), name = "db_config_version_history")]
    async fn config_version_history(&mut self, topic: &str) -> Result<Vec<ConfigVersion>> {
        let rows = sqlx::query_as::<_, ConfigVersionRow>(
            "SELECT topic, signature, version, created_at FROM config_versions WHERE topic = $1 \
             ORDER BY id",
        )
        .bind(topic)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(e, format!("Failed to fetch versions of topic '{}'", topic))
        })?;

        Ok(rows.into_iter().map(ConfigVersion::from).collect())
    }

    #[instrument(
        skip(self, version),
        fields(topic = %version.topic, version = %version.version),
        name = "db_append_config_version"
    )]
    async fn append_config_version(&mut self, version: &ConfigVersion) -> Result<()> {
        sqlx::query(
            "INSERT INTO config_versions (topic, signature, version, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&version.topic)
        .bind(&version.signature)
        .bind(&version.version)
        .bind(version.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            SwitchyardError::storage(
                e,
                format!("Failed to append version of topic '{}'", version.topic),
            )
        })?;

        Ok(())
    }
}
