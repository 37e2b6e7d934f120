use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use fleetline_core::repository::{
    AssignmentWindow, LedgerError, LedgerResult, Recipients, StatusChange, TripLedger,
    TripSnapshot,
};
use fleetline_core::schedule::TripWindow;
use fleetline_shared::{
    Assignment, DeviceToken, Resource, ResourceKind, Trip, TripSchedule, TripStatus, TripStop,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

/// [`TripLedger`] over PostgreSQL.
///
/// Trip writes take transaction-scoped advisory locks on the driver and bus
/// before re-checking overlaps, so two service replicas cannot both assign
/// one resource to overlapping trips.
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    manager_id: Uuid,
    trip_date: NaiveDate,
    departure_time: NaiveTime,
    return_time: NaiveTime,
    status: String,
    seat_price_cents: i64,
    departure_location: String,
    destination_location: String,
    departure_coords: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    driver_id: Uuid,
    bus_id: Uuid,
}

#[derive(sqlx::FromRow)]
struct StopRow {
    location: String,
    geo: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    manager_id: Uuid,
    label: String,
    capacity: Option<i32>,
    archived: bool,
}

#[derive(sqlx::FromRow)]
struct WindowRow {
    id: Uuid,
    trip_date: NaiveDate,
    departure_time: NaiveTime,
    return_time: NaiveTime,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    status: String,
    trip_date: NaiveDate,
    departure_time: NaiveTime,
    return_time: NaiveTime,
    booked_seats: i64,
    bus_capacity: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct DriverTokenRow {
    device_token: Option<String>,
}

fn storage(err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::PoolTimedOut => LedgerError::Timeout,
        other => LedgerError::Storage(other.to_string()),
    }
}

fn parse_status(raw: &str) -> LedgerResult<TripStatus> {
    raw.parse::<TripStatus>()
        .map_err(|e| LedgerError::Storage(format!("bad status column: {}", e)))
}

fn resource_select(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Driver => {
            "SELECT id, manager_id, full_name AS label, NULL::INTEGER AS capacity, archived FROM drivers"
        }
        ResourceKind::Bus => {
            "SELECT id, manager_id, plate_number AS label, capacity, archived FROM buses"
        }
    }
}

fn resource_table(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Driver => "drivers",
        ResourceKind::Bus => "buses",
    }
}

fn assignment_column(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Driver => "driver_id",
        ResourceKind::Bus => "bus_id",
    }
}

impl ResourceRow {
    fn into_resource(self, kind: ResourceKind) -> Resource {
        Resource {
            id: self.id,
            kind,
            manager_id: self.manager_id,
            label: self.label,
            capacity: self.capacity.map(|c| c.max(0) as u32),
            archived: self.archived,
        }
    }
}

impl TripRow {
    fn into_trip(self, stops: Vec<TripStop>) -> LedgerResult<Trip> {
        Ok(Trip {
            id: self.id,
            manager_id: self.manager_id,
            schedule: TripSchedule::new(self.trip_date, self.departure_time, self.return_time),
            status: parse_status(&self.status)?,
            seat_price_cents: self.seat_price_cents,
            departure_location: self.departure_location,
            destination_location: self.destination_location,
            departure_coords: self.departure_coords,
            stops,
            assignment: Assignment::new(self.driver_id, self.bus_id),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PostgresLedger {
    /// Serializes writers per resource until the transaction ends.
    async fn lock_resources(tx: &mut Transaction<'_, Postgres>, assignment: &Assignment) -> LedgerResult<()> {
        let mut keys: Vec<String> = ResourceKind::ALL
            .iter()
            .map(|kind| format!("{}:{}", kind, assignment.resource_id(*kind)))
            .collect();
        keys.sort();

        for key in keys {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(&key)
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    async fn ensure_free(tx: &mut Transaction<'_, Postgres>, trip: &Trip) -> LedgerResult<()> {
        let window = TripWindow::of(&trip.schedule)
            .map_err(|e| LedgerError::Storage(format!("refusing to store trip {}: {}", trip.id, e)))?;
        let (from, to) = window.candidate_dates();

        for kind in ResourceKind::ALL {
            let resource_id = trip.assignment.resource_id(kind);
            let sql = format!(
                r#"
                SELECT t.id
                FROM trips t
                JOIN trip_assignments a ON a.trip_id = t.id
                WHERE a.{column} = $1
                  AND t.id <> $2
                  AND t.status <> 'CANCELLED'
                  AND t.trip_date BETWEEN $3 AND $4
                  AND (t.trip_date + t.departure_time) < $6
                  AND trip_end(t.trip_date, t.departure_time, t.return_time) > $5
                LIMIT 1
                "#,
                column = assignment_column(kind)
            );

            let held: Option<Uuid> = sqlx::query_scalar(&sql)
                .bind(resource_id)
                .bind(trip.id)
                .bind(from)
                .bind(to)
                .bind(window.start)
                .bind(window.end)
                .fetch_optional(&mut **tx)
                .await
                .map_err(storage)?;

            if let Some(trip_id) = held {
                return Err(LedgerError::Conflict {
                    kind,
                    resource_id,
                    trip_id,
                });
            }
        }
        Ok(())
    }

    async fn write_stops(tx: &mut Transaction<'_, Postgres>, trip: &Trip) -> LedgerResult<()> {
        sqlx::query("DELETE FROM trip_stops WHERE trip_id = $1")
            .bind(trip.id)
            .execute(&mut **tx)
            .await
            .map_err(storage)?;

        for (position, stop) in trip.stops.iter().enumerate() {
            sqlx::query("INSERT INTO trip_stops (trip_id, position, location, geo) VALUES ($1, $2, $3, $4)")
                .bind(trip.id)
                .bind(position as i32)
                .bind(&stop.location)
                .bind(&stop.geo)
                .execute(&mut **tx)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }
}

#[async_trait]
impl TripLedger for PostgresLedger {
    async fn get_trip(&self, id: Uuid) -> LedgerResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(
            r#"
            SELECT t.id, t.manager_id, t.trip_date, t.departure_time, t.return_time, t.status,
                   t.seat_price_cents, t.departure_location, t.destination_location,
                   t.departure_coords, t.created_at, t.updated_at, a.driver_id, a.bus_id
            FROM trips t
            JOIN trip_assignments a ON a.trip_id = t.id
            WHERE t.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stops = sqlx::query_as::<_, StopRow>(
            "SELECT location, geo FROM trip_stops WHERE trip_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?
        .into_iter()
        .map(|s| TripStop {
            location: s.location,
            geo: s.geo,
        })
        .collect();

        row.into_trip(stops).map(Some)
    }

    async fn get_resource(&self, kind: ResourceKind, id: Uuid) -> LedgerResult<Option<Resource>> {
        let sql = format!("{} WHERE id = $1", resource_select(kind));
        let row = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.into_resource(kind)))
    }

    async fn list_resources(&self, kind: ResourceKind, manager_id: Uuid) -> LedgerResult<Vec<Resource>> {
        let sql = format!("{} WHERE manager_id = $1 ORDER BY label", resource_select(kind));
        let rows = sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(manager_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(rows.into_iter().map(|r| r.into_resource(kind)).collect())
    }

    async fn assignments_between(
        &self,
        kind: ResourceKind,
        resource_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<AssignmentWindow>> {
        let sql = format!(
            r#"
            SELECT t.id, t.trip_date, t.departure_time, t.return_time
            FROM trips t
            JOIN trip_assignments a ON a.trip_id = t.id
            WHERE a.{column} = $1
              AND t.status <> 'CANCELLED'
              AND t.trip_date BETWEEN $2 AND $3
            "#,
            column = assignment_column(kind)
        );

        let rows = sqlx::query_as::<_, WindowRow>(&sql)
            .bind(resource_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|r| AssignmentWindow {
                trip_id: r.id,
                schedule: TripSchedule::new(r.trip_date, r.departure_time, r.return_time),
            })
            .collect())
    }

    async fn reconciliation_snapshot(&self) -> LedgerResult<Vec<TripSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT t.id, t.status, t.trip_date, t.departure_time, t.return_time,
                   (SELECT COUNT(*) FROM bookings b WHERE b.trip_id = t.id) AS booked_seats,
                   bu.capacity AS bus_capacity
            FROM trips t
            LEFT JOIN trip_assignments a ON a.trip_id = t.id
            LEFT JOIN buses bu ON bu.id = a.bus_id
            WHERE t.status NOT IN ('COMPLETE', 'CANCELLED')
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.into_iter()
            .map(|r| {
                Ok(TripSnapshot {
                    trip_id: r.id,
                    status: parse_status(&r.status)?,
                    schedule: TripSchedule::new(r.trip_date, r.departure_time, r.return_time),
                    booked_seats: r.booked_seats.clamp(0, u32::MAX as i64) as u32,
                    bus_capacity: r.bus_capacity.map(|c| c.max(0) as u32),
                })
            })
            .collect()
    }

    async fn apply_status_changes(&self, changes: &[StatusChange]) -> LedgerResult<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = changes.iter().map(|c| c.trip_id).collect();
        let from: Vec<String> = changes.iter().map(|c| c.from.as_str().to_string()).collect();
        let to: Vec<String> = changes.iter().map(|c| c.to.as_str().to_string()).collect();

        // Single statement: all changes land or none do.
        let result = sqlx::query(
            r#"
            UPDATE trips t
            SET status = c.to_status, updated_at = NOW()
            FROM UNNEST($1::uuid[], $2::text[], $3::text[]) AS c(id, from_status, to_status)
            WHERE t.id = c.id AND t.status = c.from_status
            "#,
        )
        .bind(&ids)
        .bind(&from)
        .bind(&to)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.rows_affected() as usize)
    }

    async fn insert_trip(&self, trip: &Trip) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        Self::lock_resources(&mut tx, &trip.assignment).await?;
        Self::ensure_free(&mut tx, trip).await?;

        sqlx::query(
            r#"
            INSERT INTO trips (id, manager_id, trip_date, departure_time, return_time, status,
                               seat_price_cents, departure_location, destination_location,
                               departure_coords, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(trip.id)
        .bind(trip.manager_id)
        .bind(trip.schedule.date)
        .bind(trip.schedule.departure_time)
        .bind(trip.schedule.return_time)
        .bind(trip.status.as_str())
        .bind(trip.seat_price_cents)
        .bind(&trip.departure_location)
        .bind(&trip.destination_location)
        .bind(&trip.departure_coords)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("INSERT INTO trip_assignments (trip_id, driver_id, bus_id) VALUES ($1, $2, $3)")
            .bind(trip.id)
            .bind(trip.assignment.driver_id)
            .bind(trip.assignment.bus_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        Self::write_stops(&mut tx, trip).await?;

        tx.commit().await.map_err(storage)?;
        debug!(trip_id = %trip.id, "trip row inserted");
        Ok(())
    }

    async fn replace_trip(&self, trip: &Trip) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // The row lock serializes this edit against the reconciler's batch,
        // so the status read here is the one the UPDATE below lands on.
        let stored: Option<String> = sqlx::query_scalar("SELECT status FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let stored = match stored {
            Some(raw) => parse_status(&raw)?,
            None => return Err(LedgerError::TripNotFound(trip.id)),
        };
        if stored.is_sticky() {
            return Err(LedgerError::Locked {
                trip_id: trip.id,
                status: stored,
            });
        }

        Self::lock_resources(&mut tx, &trip.assignment).await?;
        Self::ensure_free(&mut tx, trip).await?;

        sqlx::query(
            r#"
            UPDATE trips
            SET trip_date = $2, departure_time = $3, return_time = $4, seat_price_cents = $5,
                departure_location = $6, destination_location = $7, departure_coords = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(trip.id)
        .bind(trip.schedule.date)
        .bind(trip.schedule.departure_time)
        .bind(trip.schedule.return_time)
        .bind(trip.seat_price_cents)
        .bind(&trip.departure_location)
        .bind(&trip.destination_location)
        .bind(&trip.departure_coords)
        .bind(trip.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("UPDATE trip_assignments SET driver_id = $2, bus_id = $3 WHERE trip_id = $1")
            .bind(trip.id)
            .bind(trip.assignment.driver_id)
            .bind(trip.assignment.bus_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        Self::write_stops(&mut tx, trip).await?;

        tx.commit().await.map_err(storage)?;
        debug!(trip_id = %trip.id, "trip row replaced");
        Ok(())
    }

    async fn set_trip_status(&self, trip_id: Uuid, from: TripStatus, to: TripStatus) -> LedgerResult<bool> {
        let result = sqlx::query("UPDATE trips SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2")
            .bind(trip_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        match exists {
            Some(_) => Ok(false),
            None => Err(LedgerError::TripNotFound(trip_id)),
        }
    }

    async fn set_resource_archived(&self, kind: ResourceKind, id: Uuid, archived: bool) -> LedgerResult<()> {
        let sql = format!("UPDATE {} SET archived = $2 WHERE id = $1", resource_table(kind));
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(archived)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ResourceNotFound {
                kind,
                resource_id: id,
            });
        }
        Ok(())
    }

    async fn notification_recipients(&self, trip_id: Uuid) -> LedgerResult<Recipients> {
        let driver = sqlx::query_as::<_, DriverTokenRow>(
            r#"
            SELECT d.device_token
            FROM trips t
            LEFT JOIN trip_assignments a ON a.trip_id = t.id
            LEFT JOIN drivers d ON d.id = a.driver_id
            WHERE t.id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or(LedgerError::TripNotFound(trip_id))?;

        let passengers: Vec<String> = sqlx::query_scalar(
            "SELECT device_token FROM bookings WHERE trip_id = $1 AND device_token IS NOT NULL",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(Recipients {
            driver: driver.device_token.into_iter().map(DeviceToken::new).collect(),
            passengers: passengers.into_iter().map(DeviceToken::new).collect(),
        })
    }
}
