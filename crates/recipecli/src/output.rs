use std::io;

use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Table, row};

use crate::photos::{PhotoState, RecipeRow};

fn photo_cell(photo: PhotoState) -> String {
    match photo {
        PhotoState::Missing => "-".to_owned(),
        PhotoState::Loaded { width, height } => format!("{width}x{height}"),
        PhotoState::Failed => "[placeholder]".to_owned(),
        PhotoState::TimedOut => "[placeholder: timed out]".to_owned(),
    }
}

pub fn table(rows: &[RecipeRow]) -> Table {
    let mut table = Table::new();
    table.set_format(*FORMAT_CLEAN);
    table.set_titles(row![b => "Name", "Cuisine", "Photo", "URL"]);

    for recipe in rows {
        let url = recipe
            .photo_url
            .as_ref()
            .map(|url| url.to_string())
            .unwrap_or_default();
        table.add_row(row![
            recipe.name,
            recipe.cuisine,
            photo_cell(recipe.photo),
            url
        ]);
    }

    table
}

pub fn print_table(rows: &[RecipeRow]) {
    if rows.is_empty() {
        println!("No recipes available.");
        return;
    }
    table(rows).printstd();
}

pub fn print_json(rows: &[RecipeRow]) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(io::stdout().lock(), rows)?;
    println!();
    Ok(())
}
