//! Help and version output.

/// Display the full usage text.
pub fn display_help() {
    log_version!();
    log_block_start!("Usage: adaptive-light [OPTIONS] [COMMAND]");
    log_block_start!("Commands:");
    log_indented!("run [FILE]               Restore stored transitions and keep them running");
    log_indented!("                         (optionally applying FILE first; the default)");
    log_indented!("simulate, sim FILE       Apply FILE under a simulated clock");
    log_indented!("inspect, i               Print the stored transitions");
    log_indented!("clear                    Erase stored transitions and the logical clock");
    log_indented!("help                     Show this help");
    log_block_start!("Options:");
    log_indented!("-c, --config <DIR>       Read adaptive-light.toml from DIR");
    log_indented!("-d, --debug              Show debug output");
    log_indented!("-h, --help               Show this help");
    log_indented!("-V, --version            Show the version");
    log_block_start!("Simulate options:");
    log_indented!("--duration <SECS>        Stop after SECS simulated seconds");
    log_indented!("-m, --multiplier <X>     Run X times faster than real time (0 = instant)");
    log_indented!("--log <FILE>             Also write output to FILE");
    log_block_start!("Inspect options:");
    log_indented!("--json                   Print the transitions as JSON");
    log_block_start!("Transition files (TOML or JSON):");
    log_indented!("[[transition]]");
    log_indented!("characteristic = 19");
    log_indented!("end = \"loop\"               # or \"stop\"");
    log_indented!("update_interval_ms = 60000");
    log_indented!("[transition.curve]");
    log_indented!("type = \"linear\"            # or \"derived\"");
    log_indented!("points = [{{ target = 250, duration_ms = 3600000 }}]");
    log_end!();
}

pub fn display_version() {
    println!("adaptive-light {}", env!("CARGO_PKG_VERSION"));
}
