use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, ffi, params};
use rust_decimal::Decimal;

use super::schema::SCHEMA;
use super::{Store, StoreTx, format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

impl FromSql for OrderState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        OrderState::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown order state '{s}'").into()))
    }
}

impl ToSql for OrderState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RaffleState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        RaffleState::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown raffle state '{s}'").into()))
    }
}

impl ToSql for RaffleState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn get_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

const RAFFLE_COLUMNS: &str =
    "id, title, description, unit_price, stock_total, stock_assigned, state, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, raffle_id, buyer_email, quantity, total, state, idempotency_key, \
     client_transaction_id, payment_intent_id, created_at, updated_at";

fn raffle_from_row(row: &Row<'_>) -> rusqlite::Result<Raffle> {
    Ok(Raffle {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        unit_price: get_decimal(row, 3)?,
        stock_total: row.get(4)?,
        stock_assigned: row.get(5)?,
        state: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        raffle_id: row.get(1)?,
        buyer_email: row.get(2)?,
        quantity: row.get(3)?,
        total: get_decimal(row, 4)?,
        state: row.get(5)?,
        idempotency_key: row.get(6)?,
        client_transaction_id: row.get(7)?,
        payment_intent_id: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn webhook_event_from_row(row: &Row<'_>) -> rusqlite::Result<WebhookEvent> {
    Ok(WebhookEvent {
        provider: row.get(0)?,
        payment_intent_id: row.get(1)?,
        signature_valid: row.get(2)?,
        payload: row.get(3)?,
        processed_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        expires_at: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
    })
}

fn select_raffle(conn: &Connection, id: &str) -> Result<Option<Raffle>> {
    conn.query_row(
        &format!("SELECT {RAFFLE_COLUMNS} FROM raffles WHERE id = ?1"),
        params![id],
        raffle_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn select_order_by(conn: &Connection, column: &str, value: &str) -> Result<Option<Order>> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = ?1"),
        params![value],
        order_from_row,
    )
    .optional()
    .map_err(Error::from)
}

fn select_order_numbers(conn: &Connection, order_id: &str) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT number FROM assignments WHERE order_id = ?1 ORDER BY number")?;
    let rows = stmt.query_map(params![order_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn update_order_state(
    conn: &Connection,
    id: &str,
    from: OrderState,
    to: OrderState,
    now: DateTime<Utc>,
) -> Result<bool> {
    if !from.can_transition_to(to) {
        return Err(Error::InvalidState(format!(
            "order cannot move from {from} to {to}"
        )));
    }
    let rows = conn.execute(
        "UPDATE orders SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
        params![to, format_datetime(&now), id, from],
    )?;
    Ok(rows > 0)
}

fn update_payment_intent(
    conn: &Connection,
    id: &str,
    payment_intent_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = conn.execute(
        "UPDATE orders SET payment_intent_id = ?1, updated_at = ?2
         WHERE id = ?3 AND payment_intent_id IS NULL",
        params![payment_intent_id, format_datetime(&now), id],
    );

    match result {
        Ok(rows) => Ok(rows > 0),
        Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
        Err(e) => Err(Error::from(e)),
    }
}

fn insert_webhook_event(conn: &Connection, event: &WebhookEvent) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO webhook_events (provider, payment_intent_id, signature_valid, payload, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.provider,
            event.payment_intent_id,
            event.signature_valid,
            event.payload,
            format_datetime(&event.processed_at),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(Error::from(e)),
    }
}

fn upgrade_unsigned_event(conn: &Connection, event: &WebhookEvent) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE webhook_events SET provider = ?1, signature_valid = 1, payload = ?2, processed_at = ?3
         WHERE payment_intent_id = ?4 AND signature_valid = 0",
        params![
            event.provider,
            event.payload,
            format_datetime(&event.processed_at),
            event.payment_intent_id,
        ],
    )?;
    Ok(rows > 0)
}

/// Transaction-scoped view over the connection.
struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn get_order(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(self.conn, "id", id)
    }

    fn get_order_by_client_transaction_id(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(self.conn, "client_transaction_id", id)
    }

    fn get_order_by_payment_intent_id(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(self.conn, "payment_intent_id", id)
    }

    fn get_raffle(&self, id: &str) -> Result<Option<Raffle>> {
        select_raffle(self.conn, id)
    }

    fn list_order_numbers(&self, order_id: &str) -> Result<Vec<i64>> {
        select_order_numbers(self.conn, order_id)
    }

    fn insert_assignment(&self, assignment: &Assignment) -> Result<bool> {
        let result = self.conn.execute(
            "INSERT INTO assignments (order_id, raffle_id, number, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                assignment.order_id,
                assignment.raffle_id,
                assignment.number,
                format_datetime(&assignment.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn increment_stock_assigned(
        &self,
        raffle_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE raffles SET stock_assigned = stock_assigned + ?1, updated_at = ?2
             WHERE id = ?3 AND stock_assigned + ?1 <= stock_total",
            params![quantity, format_datetime(&now), raffle_id],
        )?;

        if rows == 0 {
            let raffle = select_raffle(self.conn, raffle_id)?.ok_or(Error::NotFound)?;
            return Err(Error::InsufficientStock {
                requested: quantity,
                remaining: raffle.remaining(),
            });
        }
        Ok(())
    }

    fn set_raffle_state(
        &self,
        raffle_id: &str,
        state: RaffleState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE raffles SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state, format_datetime(&now), raffle_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn transition_order(
        &self,
        id: &str,
        from: OrderState,
        to: OrderState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        update_order_state(self.conn, id, from, to, now)
    }

    fn set_order_payment_intent(
        &self,
        id: &str,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        update_payment_intent(self.conn, id, payment_intent_id, now)
    }

    fn record_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
        insert_webhook_event(self.conn, event)
    }

    fn upgrade_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
        upgrade_unsigned_event(self.conn, event)
    }

    fn get_rate_limit(&self, bucket: &str, ident_hash: &str) -> Result<Option<RateLimitBucket>> {
        self.conn
            .query_row(
                "SELECT bucket, ident_hash, count, window_end
                 FROM rate_limits WHERE bucket = ?1 AND ident_hash = ?2",
                params![bucket, ident_hash],
                |row| {
                    Ok(RateLimitBucket {
                        bucket: row.get(0)?,
                        ident_hash: row.get(1)?,
                        count: row.get(2)?,
                        window_end: parse_datetime(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn put_rate_limit(&self, bucket: &RateLimitBucket) -> Result<()> {
        self.conn.execute(
            "INSERT INTO rate_limits (bucket, ident_hash, count, window_end)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (bucket, ident_hash)
             DO UPDATE SET count = excluded.count, window_end = excluded.window_end",
            params![
                bucket.bucket,
                bucket.ident_hash,
                bucket.count,
                format_datetime(&bucket.window_end),
            ],
        )?;
        Ok(())
    }

    fn increment_rate_limit(&self, bucket: &str, ident_hash: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE rate_limits SET count = count + 1 WHERE bucket = ?1 AND ident_hash = ?2",
            params![bucket, ident_hash],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn StoreTx) -> Result<()>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let scoped = SqliteTx { conn: &tx };
            // Dropping `tx` on the error path rolls back.
            f(&scoped)?;
        }
        tx.commit()?;
        Ok(())
    }

    // Raffle operations

    fn create_raffle(&self, raffle: &Raffle) -> Result<()> {
        self.conn().execute(
            "INSERT INTO raffles (id, title, description, unit_price, stock_total, stock_assigned,
                                  state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                raffle.id,
                raffle.title,
                raffle.description,
                raffle.unit_price.to_string(),
                raffle.stock_total,
                raffle.stock_assigned,
                raffle.state,
                format_datetime(&raffle.created_at),
                format_datetime(&raffle.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_raffle(&self, id: &str) -> Result<Option<Raffle>> {
        select_raffle(&self.conn(), id)
    }

    fn update_raffle(&self, raffle: &Raffle) -> Result<()> {
        // stock_assigned is owned by the assignment transaction and never written here.
        let rows = self.conn().execute(
            "UPDATE raffles SET title = ?1, description = ?2, unit_price = ?3, stock_total = ?4,
                                state = ?5, updated_at = ?6
             WHERE id = ?7 AND stock_assigned <= ?4",
            params![
                raffle.title,
                raffle.description,
                raffle.unit_price.to_string(),
                raffle.stock_total,
                raffle.state,
                format_datetime(&raffle.updated_at),
                raffle.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Order operations

    fn create_order(&self, order: &Order) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO orders (id, raffle_id, buyer_email, quantity, total, state, idempotency_key,
                                 client_transaction_id, payment_intent_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                order.id,
                order.raffle_id,
                order.buyer_email,
                order.quantity,
                order.total.to_string(),
                order.state,
                order.idempotency_key,
                order.client_transaction_id,
                order.payment_intent_id,
                format_datetime(&order.created_at),
                format_datetime(&order.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_order(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(&self.conn(), "id", id)
    }

    fn get_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        select_order_by(&self.conn(), "idempotency_key", key)
    }

    fn get_order_by_client_transaction_id(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(&self.conn(), "client_transaction_id", id)
    }

    fn get_order_by_payment_intent_id(&self, id: &str) -> Result<Option<Order>> {
        select_order_by(&self.conn(), "payment_intent_id", id)
    }

    fn client_transaction_id_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE client_transaction_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn transition_order(
        &self,
        id: &str,
        from: OrderState,
        to: OrderState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        update_order_state(&self.conn(), id, from, to, now)
    }

    fn set_order_payment_intent(
        &self,
        id: &str,
        payment_intent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        update_payment_intent(&self.conn(), id, payment_intent_id, now)
    }

    fn list_orders_by_state(&self, state: OrderState) -> Result<Vec<Order>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE state = ?1 ORDER BY created_at"
        ))?;

        let rows = stmt.query_map(params![state], order_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_order_numbers(&self, order_id: &str) -> Result<Vec<i64>> {
        select_order_numbers(&self.conn(), order_id)
    }

    fn list_orders_with_numbers(
        &self,
        email: &str,
        states: &[OrderState],
    ) -> Result<Vec<OrderNumbers>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT o.id, o.raffle_id, r.title, o.quantity, o.state, o.created_at
             FROM orders o JOIN raffles r ON r.id = o.raffle_id
             WHERE o.buyer_email = ?1
             ORDER BY o.created_at DESC",
        )?;

        let rows = stmt.query_map(params![email], |row| {
            Ok(OrderNumbers {
                order_id: row.get(0)?,
                raffle_id: row.get(1)?,
                raffle_title: row.get(2)?,
                quantity: row.get(3)?,
                state: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
                numbers: Vec::new(),
            })
        })?;

        let mut orders = Vec::new();
        for row in rows {
            let mut order = row?;
            if !states.contains(&order.state) {
                continue;
            }
            order.numbers = select_order_numbers(&conn, &order.order_id)?;
            orders.push(order);
        }
        Ok(orders)
    }

    fn count_assignments(&self, raffle_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assignments WHERE raffle_id = ?1",
            params![raffle_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Webhook journal

    fn record_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
        insert_webhook_event(&self.conn(), event)
    }

    fn upgrade_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
        upgrade_unsigned_event(&self.conn(), event)
    }

    fn get_webhook_event(&self, payment_intent_id: &str) -> Result<Option<WebhookEvent>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT provider, payment_intent_id, signature_valid, payload, processed_at
             FROM webhook_events WHERE payment_intent_id = ?1",
            params![payment_intent_id],
            webhook_event_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn count_webhook_events(&self, payment_intent_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM webhook_events WHERE payment_intent_id = ?1",
            params![payment_intent_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&now), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    // Recovery link operations

    fn create_recovery_token(&self, token: &RecoveryToken) -> Result<()> {
        self.conn().execute(
            "INSERT INTO recovery_tokens (token_hash, email, expires_at, used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.token_hash,
                token.email,
                format_datetime(&token.expires_at),
                token.used,
                format_datetime(&token.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_recovery_token(&self, token_hash: &str) -> Result<Option<RecoveryToken>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT token_hash, email, expires_at, used, created_at
             FROM recovery_tokens WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok(RecoveryToken {
                    token_hash: row.get(0)?,
                    email: row.get(1)?,
                    expires_at: parse_datetime(&row.get::<_, String>(2)?),
                    used: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn consume_recovery_token(&self, token_hash: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE recovery_tokens SET used = 1 WHERE token_hash = ?1 AND used = 0",
            params![token_hash],
        )?;
        Ok(rows > 0)
    }
}
