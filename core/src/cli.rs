use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for the recipecore application.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalOpts {
    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the database and image files.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Enable or disable logging (true/false).
    #[arg(long, global = true)]
    pub logging: Option<bool>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Keep running and clean up unused images in the background.
    Run,
    /// Delete unused images right now.
    Reclaim {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Insert the bundled sample recipes into an empty store.
    Seed,
    /// Operations on recipes.
    Recipe {
        #[command(subcommand)]
        command: RecipeCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecipeCommand {
    /// List recipes.
    List {
        /// Only favorites.
        #[arg(long, conflicts_with = "viewed")]
        favorites: bool,
        /// Only recently viewed recipes.
        #[arg(long)]
        viewed: bool,
        /// Filter by name or ingredient.
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one recipe and mark it as viewed.
    Show { id: i64 },
    /// Create a recipe.
    Add {
        #[arg(long)]
        name: String,
        /// Comma separated ingredients.
        #[arg(long)]
        ingredients: String,
        #[arg(long)]
        guide: String,
        /// Photo to attach.
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Change an existing recipe.
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ingredients: Option<String>,
        #[arg(long)]
        guide: Option<String>,
        /// Replace the attached photo.
        #[arg(long, conflicts_with = "clear_image")]
        image: Option<PathBuf>,
        /// Remove the attached photo.
        #[arg(long)]
        clear_image: bool,
    },
    /// Mark or unmark a favorite.
    Favorite {
        id: i64,
        /// Remove from favorites instead.
        #[arg(long)]
        off: bool,
    },
    /// Delete a recipe.
    Delete { id: i64 },
    /// Print recipe counts.
    Stats,
}
