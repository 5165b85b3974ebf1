use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 13] = [
        "RUST_LOG",
        "DPG_HOST",
        "DPG_PORT",
        "DPG_DATABASE_URL",
        "DPG_USE_MOCK_PROVIDERS",
        "DPG_VISA_WORKERS",
        "DPG_VOUCHER_WORKERS",
        "DPG_QUEUE_POLL_MILLIS",
        "DPG_CANCEL_SWEEP_SECS",
        "DPG_BALANCE_SWEEP_SECS",
        "DPG_REMINDER_SWEEP_SECS",
        "DPG_WALLET_REFRESH_SWEEP_SECS",
        "DPG_INTERSOLVE_VISA_BASE_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
