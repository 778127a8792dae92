//! Common constants used throughout tmplgen.

/// Project manifest file names, in lookup order.
pub const MANIFEST_FILES: [&str; 4] =
    ["project.toml", "project.json", "project.yml", "project.yaml"];

/// Context key holding the project directory name.
pub const PROJECT_DIR_KEY: &str = "project_dir";

/// Context key holding the absolute project root.
pub const PROJECT_ROOT_KEY: &str = "project_root";

/// Manifest key that derived identifiers are computed from.
pub const NAME_KEY: &str = "name";
