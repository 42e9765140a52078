//! SQL schema for the visit report SQLite store.
//!
//! Reports live in a generic partitioned document table; the contact lookup
//! used by fan-out is served by an expression index on the embedded contact id.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per document. `body` is the full JSON document, including its
-- `type` discriminator, exactly as the gateway returns it.
CREATE TABLE IF NOT EXISTS documents (
    partition   TEXT NOT NULL,   -- partition key, e.g. 'visitreport'
    id          TEXT NOT NULL,
    body        TEXT NOT NULL,
    PRIMARY KEY (partition, id)
);

-- Fan-out lookups: every report embedding a given contact.
CREATE INDEX IF NOT EXISTS documents_contact_idx
    ON documents(partition, json_extract(body, '$.contact.id'));

PRAGMA user_version = 1;
";
