mod error;

use argh::FromArgs;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};

pub use error::Error;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "argon",
    description = "Hash a password for the `simple` backend following the argon2id algorithm"
)]
pub struct Options {
    #[argh(option, short = 'u')]
    /// username to prefix the printed options pair with
    username: Option<String>,
}

pub struct Command {}

impl Command {
    pub fn run(options: &Options) -> Result<(), Error> {
        let password = rpassword::prompt_password("Input Password: ")?;
        let hash = generate_password(&password)?;
        println!("{}", options_pair(options.username.as_deref(), &hash));
        Ok(())
    }
}

fn generate_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(OsRng);

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
    let hash = argon.hash_password(password.as_bytes(), &salt)?;

    Ok(hash.to_string())
}

/// PHC strings carry commas, so the hash is quoted to survive the options parser.
fn options_pair(username: Option<&str>, hash: &str) -> String {
    match username {
        Some(username) => format!(r#"{username}="{hash}""#),
        None => format!(r#""{hash}""#),
    }
}
