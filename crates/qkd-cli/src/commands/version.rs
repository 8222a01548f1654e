//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - quantum key distribution simulator",
        style("qkd").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  qkd-sim       Single-qubit and Bell-pair simulator");
    println!("  qkd-protocol  BB84, B92 and E91 engines with reconciliation");
    println!("  qkd-cli       Command-line interface");
    println!();
    println!("Variants:   BB84, B92, E91");
    println!("License:    {}", style("Apache-2.0").dim());
}
