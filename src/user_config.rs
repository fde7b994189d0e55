// chix Configuration
// Edit this file to customize your editor, then rebuild

use crate::config::Config;

/// User configuration function
pub fn configure(config: &mut Config) {
    // Shell aliases
    config.alias("o", "open");
    config.alias("n", "new");
    config.alias("w", "save");
    config.alias("r", "run");
    config.alias("i", "interactive");
    config.alias("a", "analyze");
    config.alias("q", "quit");
    config.alias("ls", "tabs");
    config.alias("p", "show");

    // =========================================================================
    // EDITOR SETTINGS
    // =========================================================================
    config.set("tab_width", 4); // Spaces per tab level
    config.set("word_wrap", false);
    config.set("show_minimap", true);

    // Theme mode: "dark" | "light" | "system"
    config.set("theme", "dark");

    // =========================================================================
    // RUNNING CODE
    // =========================================================================
    // Default run mode: "compile" (gcc/clang/tcc) or "interpret" (tcc -run)
    config.set("mode", "compile");

    // Preferred compiler, probed before gcc/clang/tcc. Empty = defaults only.
    config.set("compiler", "");

    // Wall-clock bound for one compile or interpret run
    config.set("run_timeout_secs", 10);

    // Bound for each `--version` probe during tool detection
    config.set("probe_timeout_ms", 1000);

    // =========================================================================
    // CRASH RECOVERY
    // =========================================================================
    // Modified tabs are snapshotted this often
    config.set("autosave_interval_secs", 60);

    // Snapshots older than this are deleted at startup
    config.set("autosave_max_age_days", 7);
}
