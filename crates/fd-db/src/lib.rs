use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lifecycle::{PaymentSnapshot, ShipmentStore};
use fd_schemas::{
    Customer, Driver, Paise, PaymentStatus, Shipment, ShipmentStatus, ShipmentWithRelations,
    Vehicle,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub const ENV_DB_URL: &str = "FD_DATABASE_URL";

/// Connect to Postgres using FD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='shipments'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_shipments_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_shipments_table: bool,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

// Revenue is numeric(12,2) in rupees; it crosses into Rust as integer paise.
const SHIPMENT_SELECT: &str = r#"
    select
      s.id,
      s.shipment_number,
      s.status,
      s.payment_status,
      s.otp_verified_at,
      (s.revenue * 100)::bigint as revenue_paise,
      s.phonepe_order_id,
      s.start_location,
      s.destination,
      s.customer_id,
      s.driver_id,
      s.vehicle_id,
      s.created_at,
      c.id as c_id,
      c.name as c_name,
      c.phone_number as c_phone_number,
      d.id as d_id,
      d.name as d_name,
      v.id as v_id,
      v.type as v_type,
      v.license_plate as v_license_plate
    from shipments s
    left join customers c on c.id = s.customer_id
    left join drivers d on d.id = s.driver_id
    left join vehicles v on v.id = s.vehicle_id
"#;

fn shipment_from_row(row: &PgRow) -> Result<ShipmentWithRelations> {
    let status: ShipmentStatus = row.try_get::<String, _>("status")?.parse()?;
    let payment_status: Option<PaymentStatus> = row
        .try_get::<Option<String>, _>("payment_status")?
        .map(|s| s.parse())
        .transpose()?;

    let shipment = Shipment {
        id: row.try_get("id")?,
        shipment_number: row.try_get("shipment_number")?,
        status,
        payment_status,
        otp_verified_at: row.try_get("otp_verified_at")?,
        revenue: row.try_get::<Option<i64>, _>("revenue_paise")?.map(Paise),
        phonepe_order_id: row.try_get("phonepe_order_id")?,
        start_location: row.try_get("start_location")?,
        destination: row.try_get("destination")?,
        customer_id: row.try_get("customer_id")?,
        driver_id: row.try_get("driver_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        created_at: row.try_get("created_at")?,
    };

    let customer = match row.try_get::<Option<Uuid>, _>("c_id")? {
        Some(id) => Some(Customer {
            id,
            name: row.try_get("c_name")?,
            phone_number: row.try_get("c_phone_number")?,
        }),
        None => None,
    };
    let driver = match row.try_get::<Option<Uuid>, _>("d_id")? {
        Some(id) => Some(Driver {
            id,
            name: row.try_get("d_name")?,
        }),
        None => None,
    };
    let vehicle = match row.try_get::<Option<Uuid>, _>("v_id")? {
        Some(id) => Some(Vehicle {
            id,
            r#type: row.try_get("v_type")?,
            license_plate: row.try_get("v_license_plate")?,
        }),
        None => None,
    };

    Ok(ShipmentWithRelations {
        shipment,
        customer,
        driver,
        vehicle,
    })
}

pub async fn fetch_shipment(pool: &PgPool, id: Uuid) -> Result<Option<ShipmentWithRelations>> {
    let sql = format!("{SHIPMENT_SELECT} where s.id = $1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_shipment failed")?;

    row.as_ref().map(shipment_from_row).transpose()
}

/// Newest first.
pub async fn list_shipments(pool: &PgPool) -> Result<Vec<ShipmentWithRelations>> {
    let sql = format!("{SHIPMENT_SELECT} order by s.created_at desc, s.shipment_number desc");
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("list_shipments failed")?;

    rows.iter().map(shipment_from_row).collect()
}

// ---------------------------------------------------------------------------
// Guarded writes
// ---------------------------------------------------------------------------

/// `status = target` only while the row still has `expected`.
pub async fn compare_and_set_status(
    pool: &PgPool,
    id: Uuid,
    expected: ShipmentStatus,
    target: ShipmentStatus,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update shipments
           set status = $3
         where id = $1
           and status = $2
        "#,
    )
    .bind(id)
    .bind(expected.as_str())
    .bind(target.as_str())
    .execute(pool)
    .await
    .context("compare_and_set_status failed")?;

    Ok(res.rows_affected() == 1)
}

/// Attach a fresh gateway reference. Lands only while the row is still
/// `arrived`, not completed, and its payment fields equal `observed`.
pub async fn record_payment_initiated(
    pool: &PgPool,
    id: Uuid,
    observed: &PaymentSnapshot,
    merchant_transaction_id: &str,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update shipments
           set payment_status = 'initiated',
               phonepe_order_id = $2
         where id = $1
           and status = 'arrived'
           and payment_status is distinct from 'completed'
           and payment_status is not distinct from $3
           and phonepe_order_id is not distinct from $4
        "#,
    )
    .bind(id)
    .bind(merchant_transaction_id)
    .bind(observed.payment_status.map(|s| s.as_str()))
    .bind(observed.phonepe_order_id.as_deref())
    .execute(pool)
    .await
    .context("record_payment_initiated failed")?;

    Ok(res.rows_affected() == 1)
}

/// Settle an in-flight payment by gateway reference.
pub async fn record_payment_result(
    pool: &PgPool,
    merchant_transaction_id: &str,
    result: PaymentStatus,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update shipments
           set payment_status = $2
         where phonepe_order_id = $1
           and payment_status = 'initiated'
        "#,
    )
    .bind(merchant_transaction_id)
    .bind(result.as_str())
    .execute(pool)
    .await
    .context("record_payment_result failed")?;

    Ok(res.rows_affected() == 1)
}

pub async fn delete_shipment(pool: &PgPool, id: Uuid) -> Result<bool> {
    let res = sqlx::query("delete from shipments where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_shipment failed")?;
    Ok(res.rows_affected() == 1)
}

// ---------------------------------------------------------------------------
// Inserts (back-office ingest and test fixtures)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
}

pub async fn insert_customer(pool: &PgPool, c: &NewCustomer) -> Result<()> {
    sqlx::query("insert into customers (id, name, phone_number) values ($1, $2, $3)")
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.phone_number)
        .execute(pool)
        .await
        .context("insert_customer failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewShipment {
    pub id: Uuid,
    pub shipment_number: String,
    pub status: ShipmentStatus,
    pub payment_status: Option<PaymentStatus>,
    pub otp_verified_at: Option<DateTime<Utc>>,
    pub revenue: Option<Paise>,
    pub start_location: String,
    pub destination: String,
    pub customer_id: Option<Uuid>,
}

pub async fn insert_shipment(pool: &PgPool, s: &NewShipment) -> Result<()> {
    sqlx::query(
        r#"
        insert into shipments (
          id, shipment_number, status, payment_status, otp_verified_at,
          revenue, start_location, destination, customer_id
        ) values (
          $1, $2, $3, $4, $5,
          ($6::bigint)::numeric / 100, $7, $8, $9
        )
        "#,
    )
    .bind(s.id)
    .bind(&s.shipment_number)
    .bind(s.status.as_str())
    .bind(s.payment_status.map(|p| p.as_str()))
    .bind(s.otp_verified_at)
    .bind(s.revenue.map(|r| r.as_i64()))
    .bind(&s.start_location)
    .bind(&s.destination)
    .bind(s.customer_id)
    .execute(pool)
    .await
    .context("insert_shipment failed")?;
    Ok(())
}

/// Map a sqlx error to "this named check constraint rejected the write".
pub fn is_check_violation(err: &anyhow::Error, constraint: &str) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| match e {
                sqlx::Error::Database(db) => Some(
                    db.code().as_deref() == Some("23514") && db.constraint() == Some(constraint),
                ),
                _ => None,
            })
            .unwrap_or(false)
    })
}

// ---------------------------------------------------------------------------
// ShipmentStore
// ---------------------------------------------------------------------------

/// Postgres-backed [`ShipmentStore`].
#[derive(Clone)]
pub struct PgShipmentStore {
    pool: PgPool,
}

impl PgShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn fetch_shipment(&self, id: Uuid) -> Result<Option<ShipmentWithRelations>> {
        fetch_shipment(&self.pool, id).await
    }

    async fn list_shipments(&self) -> Result<Vec<ShipmentWithRelations>> {
        list_shipments(&self.pool).await
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ShipmentStatus,
        target: ShipmentStatus,
    ) -> Result<bool> {
        compare_and_set_status(&self.pool, id, expected, target).await
    }

    async fn record_payment_initiated(
        &self,
        id: Uuid,
        observed: &PaymentSnapshot,
        merchant_transaction_id: &str,
    ) -> Result<bool> {
        record_payment_initiated(&self.pool, id, observed, merchant_transaction_id).await
    }

    async fn record_payment_result(
        &self,
        merchant_transaction_id: &str,
        result: PaymentStatus,
    ) -> Result<bool> {
        record_payment_result(&self.pool, merchant_transaction_id, result).await
    }

    async fn delete_shipment(&self, id: Uuid) -> Result<bool> {
        delete_shipment(&self.pool, id).await
    }
}
