use crate::api::users::hash_password;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::io::{self, BufRead, Write};

/// Read one password line from stdin and print its PHC hash.
/// # Errors
/// Returns an error if stdin is empty or hashing fails.
pub fn execute() -> Result<()> {
    let stdin = io::stdin();
    let hash = hash_line(&mut stdin.lock())?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{hash}").context("Failed to write the password hash")?;
    Ok(())
}

fn hash_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("Failed to read the password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("No password given on stdin");
    }
    hash_password(&SecretString::from(password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::PasswordHash;

    #[test]
    fn hashes_first_line_without_newline() -> Result<()> {
        let hash = hash_line(&mut "s3cret pass\nignored\n".as_bytes())?;
        let parsed = PasswordHash::new(&hash).map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(hash_line(&mut "".as_bytes()).is_err());
        assert!(hash_line(&mut "\n".as_bytes()).is_err());
    }
}
