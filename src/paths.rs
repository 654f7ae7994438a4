use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the default config file: `<exe_dir>/config.json`
pub fn get_default_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the captured pages directory of a book folder: `<book>/pages/`
pub fn get_pages_dir(book_dir: &Path) -> PathBuf {
    book_dir.join("pages")
}

/// Returns the markdown output directory of a book folder: `<book>/markdown/`
pub fn get_markdown_dir(book_dir: &Path) -> PathBuf {
    book_dir.join("markdown")
}

/// Ensures the log directory exists. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    Ok(())
}
