use std::path::Path;

use recipe_api::Recipe;
use rusqlite::{params, Connection};
use tracing::{info, warn};

/// Schema version written to `PRAGMA user_version` once fully migrated.
pub const SCHEMA_VERSION: i64 = 2;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS recipes (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  ingredients TEXT NOT NULL,
  guide TEXT NOT NULL,
  image INTEGER NOT NULL DEFAULT 0,
  is_favorite INTEGER NOT NULL DEFAULT 0,
  is_viewed INTEGER NOT NULL DEFAULT 0
);
"#;

// v2: photo attachments
const SCHEMA_V2: &str = "ALTER TABLE recipes ADD COLUMN image_path TEXT;";

/// Open (or create) the recipe database and bring its schema up to date.
pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!("cannot create database directory {}: {err}", parent.display());
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    migrate(&conn)?;
    info!("recipe database opened at {}", path.display());
    Ok(conn)
}

/// Fresh in-memory database, used by tests.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Apply every migration newer than the stored `user_version`.
///
/// Each step commits together with its version bump, so an interrupted
/// upgrade resumes from the last completed step.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version = schema_version(conn)?;
    if version < 1 {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(SCHEMA_V1)?;
        tx.execute_batch("PRAGMA user_version = 1;")?;
        tx.commit()?;
    }
    if version < 2 {
        let tx = conn.unchecked_transaction()?;
        // the column may already exist if an older build died before recording v2
        if !has_column(&tx, "recipes", "image_path")? {
            tx.execute_batch(SCHEMA_V2)?;
        }
        tx.execute_batch("PRAGMA user_version = 2;")?;
        tx.commit()?;
        info!("migrated recipe schema to v2");
    }
    Ok(())
}

/// Recipes shipped with the application.
pub fn sample_recipes() -> Vec<Recipe> {
    vec![
        Recipe {
            id: 99,
            image: 1,
            ..Recipe::new(
                "Spaghetti Carbonara",
                "Spaghetti,Eggs,Pancetta,Parmesan Cheese,Black Pepper",
                "Cook spaghetti. In a separate bowl, whisk eggs, cheese, and pepper. Fry pancetta. Combine everything.",
            )
        },
        Recipe {
            id: 100,
            image: 2,
            ..Recipe::new(
                "Chicken Tikka Masala",
                "Chicken,Yogurt,Tomato Puree,Onion,Garam Masala",
                "Marinate chicken in yogurt and spices. Cook in a tomato-based sauce with onions.",
            )
        },
    ]
}

/// Insert the sample recipes into an empty store. Returns how many were added.
pub fn seed_sample_data(conn: &Connection) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(0);
    }
    let samples = sample_recipes();
    for r in &samples {
        conn.execute(
            "INSERT INTO recipes (id, name, ingredients, guide, image, image_path, is_favorite, is_viewed) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                r.id,
                r.name,
                r.ingredients,
                r.guide,
                r.image,
                r.image_path,
                r.is_favorite,
                r.is_viewed
            ],
        )?;
    }
    info!("seeded {} sample recipes", samples.len());
    Ok(samples.len())
}
