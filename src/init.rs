//! Project initialization for helpdesk
//!
//! `helpdesk init` creates the `.helpdesk/` directory with a default
//! config file and an empty, fully migrated database.

use crate::config::Config;
use crate::db::Database;
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Initialize helpdesk in the current directory
pub fn init_project() -> Result<(), String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Could not get current directory: {}", e))?;

    println!("\n{}", "Initializing Helpdesk...".cyan().bold());
    println!("   Directory: {}\n", cwd.display());

    // 1. Create .helpdesk directory
    let helpdesk_dir = cwd.join(".helpdesk");
    create_dir_if_missing(&helpdesk_dir)?;

    // 2. Default config
    let config = Config::default();
    let rendered = config
        .to_toml()
        .map_err(|e| format!("Could not render config.toml: {}", e))?;
    write_file_if_missing(&helpdesk_dir.join("config.toml"), &rendered, ".helpdesk/config.toml")?;

    // 3. Initialize database by opening it (creates tables)
    let db_path = helpdesk_dir.join("helpdesk.db");
    let existed = db_path.exists();
    Database::open_at(&db_path, config.database.pool_size)
        .map_err(|e| format!("Could not create database: {}", e))?;
    if existed {
        println!("   {} .helpdesk/helpdesk.db (already exists, schema checked)", "Skipping".yellow());
    } else {
        println!("   {} .helpdesk/helpdesk.db", "Creating".green());
    }

    println!("\n{}", "Helpdesk initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Add reference data: {}", "helpdesk department add Finance".cyan());
    println!("  2. Configure SLAs: {}", "helpdesk sla set Hardware critical 4".cyan());
    println!(
        "  3. Register users: {}",
        "helpdesk user register Ana ana@example.com --type regular --department Finance --password <secret>"
            .cyan()
    );
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content)
            .map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}
