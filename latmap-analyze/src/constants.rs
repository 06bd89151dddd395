pub const DEFAULT_LEGEND_STEPS: usize = 5;
pub const DEFAULT_LOG_FILTER: &str = "info";

// Watch mode: one stdin line is one burst of selection changes.
pub const COMMAND_SEPARATOR: char = ';';
pub const MAX_FRAMES_PER_BURST: usize = 8;
