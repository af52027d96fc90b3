//! `codeloop files`: List the virtual workspace.

use crate::app::App;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let app = App::load()?;
    let files = app.files.list();

    if files.is_empty() {
        println!("No files (seed_sample_project is off).");
        return Ok(());
    }

    for file in files {
        println!(
            "{:>8}  {}  {}",
            file.size(),
            file.created_at().format("%Y-%m-%d %H:%M:%S"),
            file.path()
        );
    }
    Ok(())
}
