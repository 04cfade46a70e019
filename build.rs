use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

include!("src/cli.rs");

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    let man_dir = out_dir.join("../../../man");
    fs::create_dir_all(&man_dir)?;

    // Render papi-try(1) from the same clap definition the binary parses with
    let mut buffer = Vec::new();
    clap_mangen::Man::new(Cli::command()).render(&mut buffer)?;

    let page = man_dir.join("papi-try.1");
    fs::write(&page, buffer)?;

    Ok(())
}
