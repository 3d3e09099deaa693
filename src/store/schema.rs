pub const SCHEMA: &str = r#"
-- Raffles own the stock ledger
CREATE TABLE IF NOT EXISTS raffles (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    unit_price TEXT NOT NULL,          -- exact decimal, never REAL
    stock_total INTEGER NOT NULL CHECK (stock_total > 0),
    stock_assigned INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'draft',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    CHECK (stock_assigned >= 0 AND stock_assigned <= stock_total)
);

-- Orders: one buyer purchase against one raffle
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    raffle_id TEXT NOT NULL REFERENCES raffles(id),
    buyer_email TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    total TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    idempotency_key TEXT NOT NULL UNIQUE,
    client_transaction_id TEXT NOT NULL UNIQUE CHECK (length(client_transaction_id) <= 15),
    payment_intent_id TEXT UNIQUE,     -- NULL until a payment session exists
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Allocated ticket numbers; (raffle_id, number) is the uniqueness that matters
CREATE TABLE IF NOT EXISTS assignments (
    order_id TEXT NOT NULL REFERENCES orders(id),
    raffle_id TEXT NOT NULL REFERENCES raffles(id),
    number INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (raffle_id, number)
);

-- Payment notification journal (append-only)
CREATE TABLE IF NOT EXISTS webhook_events (
    provider TEXT NOT NULL,
    payment_intent_id TEXT NOT NULL UNIQUE,
    signature_valid INTEGER NOT NULL DEFAULT 0,
    payload TEXT NOT NULL,
    processed_at TEXT NOT NULL
);

-- Fixed-window rate limit counters
CREATE TABLE IF NOT EXISTS rate_limits (
    bucket TEXT NOT NULL,
    ident_hash TEXT NOT NULL,          -- never the raw email/IP
    count INTEGER NOT NULL,
    window_end TEXT NOT NULL,
    PRIMARY KEY (bucket, ident_hash)
);

-- Admin credentials
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- One-time "my numbers" links
CREATE TABLE IF NOT EXISTS recovery_tokens (
    token_hash TEXT PRIMARY KEY,       -- sha256 of the emailed token
    email TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    used INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_orders_raffle ON orders(raffle_id);
CREATE INDEX IF NOT EXISTS idx_orders_email ON orders(buyer_email);
CREATE INDEX IF NOT EXISTS idx_orders_state ON orders(state);
CREATE INDEX IF NOT EXISTS idx_assignments_order ON assignments(order_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
"#;
