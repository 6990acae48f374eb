use anyhow::{Context, Result};
use clap::Parser;
use recipe_api::Recipe;
use tracing::info;

use recipecore::{
    build_reclaimer,
    cli::{Cli, Command, RecipeCommand},
    config::Config,
    db, device_state, images, open_repository, schedule_cleanup,
    scheduler::WorkScheduler,
    services, RecipeRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli.global)?;
    services::log::init(cfg.logging_enabled);
    let repo = open_repository(&cfg)
        .with_context(|| format!("opening {}", cfg.database_path.display()))?;

    match cli.command {
        Command::Run => {
            let scheduler = WorkScheduler::new(device_state(&cfg));
            schedule_cleanup(&scheduler, repo, &cfg);
            info!("image cleanup scheduled - press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown();
        }
        Command::Reclaim { json } => {
            let reclaimer = build_reclaimer(repo, &cfg);
            let result = tokio::task::spawn_blocking(move || reclaimer.run()).await??;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "inspected {} deleted {} kept {} failed {}",
                    result.inspected,
                    result.deleted,
                    result.retained,
                    result.failed()
                );
                for f in &result.failures {
                    println!("  {}: {}", f.file_name, f.reason);
                }
            }
        }
        Command::Seed => {
            let added = db::seed_sample_data(&repo.connection().lock())?;
            println!("added {added} sample recipes");
        }
        Command::Recipe { command } => recipe_command(&repo, &cfg, command).await?,
    }
    Ok(())
}

fn print_list(recipes: &[Recipe]) {
    for r in recipes {
        println!(
            "{:<6} {:<30} {:<3} {}",
            r.id,
            r.name,
            if r.is_favorite { "*" } else { "" },
            r.image_path.as_deref().unwrap_or("")
        );
    }
}

async fn recipe_command(repo: &RecipeRepository, cfg: &Config, command: RecipeCommand) -> Result<()> {
    match command {
        RecipeCommand::List {
            favorites,
            viewed,
            search,
        } => {
            let q = search.as_deref();
            let recipes = match (favorites, viewed, q) {
                (true, _, Some(q)) => repo.search_favorite_recipes(q)?,
                (true, _, None) => repo.favorite_recipes()?,
                (_, true, Some(q)) => repo.search_recently_viewed_recipes(q)?,
                (_, true, None) => repo.recently_viewed_recipes()?,
                (_, _, Some(q)) => repo.search_recipes(q)?,
                (_, _, None) => repo.all_recipes()?,
            };
            print_list(&recipes);
        }
        RecipeCommand::Show { id } => {
            if !repo.mark_viewed(id)? {
                anyhow::bail!("recipe {id} not found");
            }
            let r = repo.recipe(id)?.context("recipe vanished")?;
            println!("{}{}", r.name, if r.is_favorite { " *" } else { "" });
            println!();
            for item in r.ingredient_list() {
                println!("- {item}");
            }
            println!();
            println!("{}", r.guide);
            if let Some(path) = &r.image_path {
                println!();
                println!("photo: {path}");
            }
        }
        RecipeCommand::Add {
            name,
            ingredients,
            guide,
            image,
        } => {
            let mut recipe = Recipe::new(name, ingredients, guide);
            if let Some(src) = image {
                recipe.image_path = Some(images::import_image(&cfg.image_dir, &src).await?);
            }
            let id = repo.insert_recipe(&recipe)?;
            println!("created recipe {id}");
        }
        RecipeCommand::Edit {
            id,
            name,
            ingredients,
            guide,
            image,
            clear_image,
        } => {
            let mut r = repo
                .recipe(id)?
                .with_context(|| format!("recipe {id} not found"))?;
            if let Some(name) = name {
                r.name = name;
            }
            if let Some(ingredients) = ingredients {
                r.ingredients = ingredients;
            }
            if let Some(guide) = guide {
                r.guide = guide;
            }
            // the replaced photo is left for the cleanup job
            if let Some(src) = image {
                r.image_path = Some(images::import_image(&cfg.image_dir, &src).await?);
            } else if clear_image {
                r.image_path = None;
            }
            repo.update_recipe(&r)?;
            println!("updated recipe {id}");
        }
        RecipeCommand::Favorite { id, off } => {
            if !repo.set_favorite(id, !off)? {
                anyhow::bail!("recipe {id} not found");
            }
        }
        RecipeCommand::Delete { id } => {
            if !repo.delete_recipe(id)? {
                anyhow::bail!("recipe {id} not found");
            }
            println!("deleted recipe {id}");
        }
        RecipeCommand::Stats => {
            println!(
                "recipes {} favorites {} viewed {}",
                repo.recipe_count()?,
                repo.favorite_count()?,
                repo.viewed_count()?
            );
        }
    }
    Ok(())
}
