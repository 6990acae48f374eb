use std::sync::Arc;

use parking_lot::Mutex;
use recipe_api::Recipe;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::{
    events::{EventBus, RecipeEvent},
    reclaimer::{ImageReference, RecordSource},
};

const COLUMNS: &str = "id, name, ingredients, guide, image, image_path, is_favorite, is_viewed";

/// Query access to the recipe table.
///
/// Cloning is cheap; clones share the connection and the change bus.
#[derive(Clone)]
pub struct RecipeRepository {
    conn: Arc<Mutex<Connection>>,
    events: Arc<Mutex<EventBus>>,
}

fn row_to_recipe(row: &Row<'_>) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        ingredients: row.get(2)?,
        guide: row.get(3)?,
        image: row.get(4)?,
        image_path: row.get(5)?,
        is_favorite: row.get(6)?,
        is_viewed: row.get(7)?,
    })
}

/// Escape LIKE wildcards so user text matches literally.
fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl RecipeRepository {
    pub fn new(conn: Connection) -> Self {
        Self::from_shared(Arc::new(Mutex::new(conn)))
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            events: Arc::new(Mutex::new(EventBus::new())),
        }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Receive a notification after every successful write.
    pub fn subscribe(&self) -> UnboundedReceiver<RecipeEvent> {
        self.events.lock().subscribe()
    }

    fn publish(&self, event: RecipeEvent) {
        self.events.lock().publish(event);
    }

    fn query_list(&self, filter: &str, query: Option<&str>) -> rusqlite::Result<Vec<Recipe>> {
        let conn = self.conn.lock();
        let mut sql = format!("SELECT {COLUMNS} FROM recipes WHERE {filter}");
        if query.is_some() {
            sql.push_str(
                " AND (name LIKE ?1 ESCAPE '\\' OR ingredients LIKE ?1 ESCAPE '\\')",
            );
        }
        sql.push_str(" ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = match query {
            Some(q) => stmt.query_map([like_pattern(q)], row_to_recipe)?,
            None => stmt.query_map([], row_to_recipe)?,
        };
        rows.collect()
    }

    fn count_where(&self, filter: &str) -> rusqlite::Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM recipes WHERE {filter}"),
            [],
            |row| row.get(0),
        )
    }

    pub fn all_recipes(&self) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("1 = 1", None)
    }

    pub fn recipe(&self, id: i64) -> rusqlite::Result<Option<Recipe>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM recipes WHERE id = ?1"),
            [id],
            row_to_recipe,
        )
        .optional()
    }

    pub fn favorite_recipes(&self) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("is_favorite = 1", None)
    }

    pub fn recently_viewed_recipes(&self) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("is_viewed = 1", None)
    }

    /// Case-insensitive match on name or ingredients.
    pub fn search_recipes(&self, query: &str) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("1 = 1", Some(query))
    }

    pub fn search_favorite_recipes(&self, query: &str) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("is_favorite = 1", Some(query))
    }

    pub fn search_recently_viewed_recipes(&self, query: &str) -> rusqlite::Result<Vec<Recipe>> {
        self.query_list("is_viewed = 1", Some(query))
    }

    pub fn recipe_count(&self) -> rusqlite::Result<i64> {
        self.count_where("1 = 1")
    }

    pub fn favorite_count(&self) -> rusqlite::Result<i64> {
        self.count_where("is_favorite = 1")
    }

    pub fn viewed_count(&self) -> rusqlite::Result<i64> {
        self.count_where("is_viewed = 1")
    }

    /// Insert a recipe, replacing any row with the same id. An id of `0`
    /// gets a fresh one. Returns the stored id.
    pub fn insert_recipe(&self, recipe: &Recipe) -> rusqlite::Result<i64> {
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                &format!("INSERT OR REPLACE INTO recipes ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    (recipe.id != 0).then_some(recipe.id),
                    recipe.name,
                    recipe.ingredients,
                    recipe.guide,
                    recipe.image,
                    recipe.image_path,
                    recipe.is_favorite,
                    recipe.is_viewed,
                ],
            )?;
            conn.last_insert_rowid()
        };
        debug!("inserted recipe {id}");
        self.publish(RecipeEvent::Inserted(id));
        Ok(id)
    }

    /// Overwrite every column of an existing recipe. Returns false when the
    /// id is unknown.
    pub fn update_recipe(&self, recipe: &Recipe) -> rusqlite::Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE recipes SET name = ?2, ingredients = ?3, guide = ?4, image = ?5, image_path = ?6, is_favorite = ?7, is_viewed = ?8 WHERE id = ?1",
            params![
                recipe.id,
                recipe.name,
                recipe.ingredients,
                recipe.guide,
                recipe.image,
                recipe.image_path,
                recipe.is_favorite,
                recipe.is_viewed,
            ],
        )?;
        if changed > 0 {
            self.publish(RecipeEvent::Updated(recipe.id));
        }
        Ok(changed > 0)
    }

    pub fn delete_recipe(&self, id: i64) -> rusqlite::Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM recipes WHERE id = ?1", [id])?;
        if changed > 0 {
            debug!("deleted recipe {id}");
            self.publish(RecipeEvent::Deleted(id));
        }
        Ok(changed > 0)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> rusqlite::Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE recipes SET is_favorite = ?2 WHERE id = ?1",
            params![id, favorite],
        )?;
        if changed > 0 {
            self.publish(RecipeEvent::Updated(id));
        }
        Ok(changed > 0)
    }

    pub fn mark_viewed(&self, id: i64) -> rusqlite::Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("UPDATE recipes SET is_viewed = 1 WHERE id = ?1", [id])?;
        if changed > 0 {
            self.publish(RecipeEvent::Updated(id));
        }
        Ok(changed > 0)
    }
}

impl RecordSource for RecipeRepository {
    type Error = rusqlite::Error;

    fn fetch_all_once(&self) -> Result<Vec<ImageReference>, Self::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, image_path FROM recipes")?;
        let rows = stmt.query_map([], |row| {
            Ok(ImageReference {
                id: row.get(0)?,
                image_path: row.get(1)?,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> RecipeRepository {
        RecipeRepository::new(db::open_in_memory().unwrap())
    }

    fn three_recipes(repo: &RecipeRepository) {
        repo.insert_recipe(&Recipe {
            id: 1,
            ..Recipe::new(
                "Spaghetti Carbonara",
                "pasta, eggs, bacon, parmesan",
                "Cook pasta. Mix eggs and cheese. Combine with bacon.",
            )
        })
        .unwrap();
        repo.insert_recipe(&Recipe {
            id: 2,
            is_favorite: true,
            is_viewed: true,
            ..Recipe::new(
                "Chicken Curry",
                "chicken, curry powder, coconut milk, onion",
                "Saute onions. Add chicken and curry. Simmer with coconut milk.",
            )
        })
        .unwrap();
        repo.insert_recipe(&Recipe {
            id: 3,
            is_viewed: true,
            ..Recipe::new(
                "Caesar Salad",
                "lettuce, croutons, parmesan, caesar dressing",
                "Toss lettuce with dressing. Add croutons and cheese.",
            )
        })
        .unwrap();
    }

    #[test]
    fn crud_roundtrip() {
        let repo = repo();
        let id = repo
            .insert_recipe(&Recipe::new("Carbonara", "pasta", "cook"))
            .unwrap();
        assert!(id > 0);
        let mut r = repo.recipe(id).unwrap().unwrap();
        assert_eq!(r.name, "Carbonara");

        r.name = "Updated Carbonara".into();
        r.is_favorite = true;
        r.image_path = Some("/storage/RECIPE_1.jpg".into());
        assert!(repo.update_recipe(&r).unwrap());
        let stored = repo.recipe(id).unwrap().unwrap();
        assert_eq!(stored, r);

        assert!(repo.delete_recipe(id).unwrap());
        assert!(repo.recipe(id).unwrap().is_none());
        assert!(!repo.delete_recipe(id).unwrap());
        assert!(!repo.update_recipe(&r).unwrap());
    }

    #[test]
    fn insert_replaces_on_conflict() {
        let repo = repo();
        repo.insert_recipe(&Recipe {
            id: 1,
            ..Recipe::new("Original", "i", "g")
        })
        .unwrap();
        repo.insert_recipe(&Recipe {
            id: 1,
            ..Recipe::new("Replaced", "i2", "g2")
        })
        .unwrap();
        let all = repo.all_recipes().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Replaced");
    }

    #[test]
    fn filters_and_search() {
        let repo = repo();
        three_recipes(&repo);

        let favorites = repo.favorite_recipes().unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(favorites[0].is_favorite);

        let viewed = repo.recently_viewed_recipes().unwrap();
        assert_eq!(viewed.len(), 2);
        assert!(viewed.iter().all(|r| r.is_viewed));

        assert_eq!(repo.search_recipes("chicken").unwrap().len(), 1);
        assert_eq!(repo.search_recipes("PARMESAN").unwrap().len(), 2);
        assert_eq!(repo.search_recipes("").unwrap().len(), 3);
        assert_eq!(repo.search_recipes("100%").unwrap().len(), 0);

        let fav = repo.search_favorite_recipes("Chicken").unwrap();
        assert_eq!(fav.len(), 1);
        assert!(fav[0].is_favorite);
        assert!(repo.search_favorite_recipes("salad").unwrap().is_empty());
        assert_eq!(repo.search_recently_viewed_recipes("parmesan").unwrap().len(), 1);
    }

    #[test]
    fn counts() {
        let repo = repo();
        three_recipes(&repo);
        assert_eq!(repo.recipe_count().unwrap(), 3);
        assert_eq!(repo.favorite_count().unwrap(), 1);
        assert_eq!(repo.viewed_count().unwrap(), 2);

        assert!(repo.set_favorite(1, true).unwrap());
        assert!(repo.mark_viewed(1).unwrap());
        assert_eq!(repo.favorite_count().unwrap(), 2);
        assert_eq!(repo.viewed_count().unwrap(), 3);
        assert!(!repo.set_favorite(42, true).unwrap());
    }

    #[test]
    fn writes_notify_subscribers() {
        let repo = repo();
        let mut rx = repo.subscribe();
        let id = repo.insert_recipe(&Recipe::new("a", "b", "c")).unwrap();
        repo.mark_viewed(id).unwrap();
        repo.delete_recipe(id).unwrap();
        assert_eq!(rx.try_recv().unwrap(), RecipeEvent::Inserted(id));
        assert_eq!(rx.try_recv().unwrap(), RecipeEvent::Updated(id));
        assert_eq!(rx.try_recv().unwrap(), RecipeEvent::Deleted(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_lists_image_references() {
        let repo = repo();
        repo.insert_recipe(&Recipe {
            image_path: Some("file:///d/RECIPE_1.jpg".into()),
            ..Recipe::new("a", "b", "c")
        })
        .unwrap();
        repo.insert_recipe(&Recipe::new("x", "y", "z")).unwrap();
        let mut refs = repo.fetch_all_once().unwrap();
        refs.sort_by_key(|r| r.id);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].image_path.as_deref(), Some("file:///d/RECIPE_1.jpg"));
        assert_eq!(refs[1].image_path, None);
    }
}
