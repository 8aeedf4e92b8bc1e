//! Built-in artifact sets replayed by the demo binary.
//!
//! Content is pre-authored; only its reveal is simulated. Each set may also
//! carry baselines for `modify` artifacts so the final diff preview has
//! something to compare against.

use scrivener_core::types::FileChange;

/// A named artifact set plus the starting content of files it modifies.
pub struct DemoSet {
    pub name: &'static str,
    pub files: Vec<FileChange>,
    pub baselines: Vec<(&'static str, &'static str)>,
}

/// Names accepted by `[demo] set = "..."`.
pub const SET_NAMES: &[&str] = &["web", "rust"];

/// Returns the set called `name`, or the `web` set for unknown names.
pub fn artifact_set(name: &str) -> DemoSet {
    match name {
        "rust" => rust_set(),
        _ => web_set(),
    }
}

fn web_set() -> DemoSet {
    DemoSet {
        name: "web",
        files: vec![
            FileChange::create(
                "index.html",
                "<!doctype html>\n<html>\n  <head>\n    <link rel=\"stylesheet\" href=\"styles.css\">\n  </head>\n  <body>\n    <main id=\"app\"></main>\n    <script src=\"app.js\"></script>\n  </body>\n</html>\n",
            )
            .with_language("html"),
            FileChange::create(
                "styles.css",
                "body {\n  margin: 0;\n  font-family: system-ui, sans-serif;\n}\n\n#app {\n  padding: 2rem;\n}\n",
            )
            .with_language("css"),
            FileChange::modify(
                "app.ts",
                "const app = document.getElementById(\"app\");\n\nexport function render(count: number): void {\n  if (app) {\n    app.textContent = `Clicked ${count} times`;\n  }\n}\n\nrender(0);\n",
            )
            .with_language("typescript"),
        ],
        baselines: vec![(
            "app.ts",
            "const app = document.getElementById(\"app\");\n\nrender(0);\n",
        )],
    }
}

fn rust_set() -> DemoSet {
    DemoSet {
        name: "rust",
        files: vec![
            FileChange::create(
                "Cargo.toml",
                "[package]\nname = \"hello\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
            )
            .with_language("toml"),
            FileChange::modify(
                "src/main.rs",
                "fn main() {\n    let name = std::env::args().nth(1).unwrap_or_else(|| \"world\".into());\n    println!(\"Hello, {name}!\");\n}\n",
            )
            .with_language("rust"),
            FileChange::delete("src/old.rs"),
        ],
        baselines: vec![
            ("src/main.rs", "fn main() {\n    println!(\"Hello, world!\");\n}\n"),
            ("src/old.rs", "pub fn unused() {}\n"),
        ],
    }
}
