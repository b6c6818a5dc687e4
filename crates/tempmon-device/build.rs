//! Bakes `TEMPMON_*` settings from a `.env` file into the binary.
//!
//! Values are read back with `option_env!` in `settings.rs`; keys missing
//! from the file keep the library defaults.

const PREFIX: &str = "TEMPMON_";

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=../../.env");

    let entries = match dotenvy::dotenv_iter() {
        Ok(entries) => entries,
        Err(e) if e.not_found() => return,
        Err(e) => {
            println!("cargo:warning=Failed to read .env: {}", e);
            return;
        }
    };

    for entry in entries {
        match entry {
            Ok((key, value)) if key.starts_with(PREFIX) => {
                println!("cargo:rerun-if-env-changed={}", key);
                println!("cargo:rustc-env={}={}", key, value);
            }
            Ok(_) => {}
            Err(e) => println!("cargo:warning=Skipping malformed .env line: {}", e),
        }
    }
}
