//! `tether account`: out-of-band account administration.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use tether_store::{AccountRepo, Database, NewAccount, StoreError};

pub(crate) fn open_repo(path: &Path) -> Result<AccountRepo> {
    let db = Database::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(AccountRepo::new(db))
}

pub(crate) fn add(
    repo: &AccountRepo,
    email: String,
    password: String,
    name: String,
    role: String,
    out: &mut impl Write,
) -> Result<()> {
    ensure!(!email.is_empty(), "email must not be empty");
    ensure!(!password.is_empty(), "password must not be empty");

    let new = NewAccount {
        email,
        password,
        name,
        role,
    };
    match repo.insert(&new) {
        Ok(account) => {
            writeln!(out, "created account {} ({})", account.id, account.email)?;
            Ok(())
        }
        Err(StoreError::Conflict(_)) => bail!("an account for {} already exists", new.email),
        Err(e) => Err(e).context("Failed to create account"),
    }
}

pub(crate) fn list(repo: &AccountRepo, out: &mut impl Write) -> Result<()> {
    let accounts = repo.list().context("Failed to list accounts")?;
    writeln!(out, "id\temail\tname\trole")?;
    for account in accounts {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            account.id, account.email, account.name, account.role
        )?;
    }
    Ok(())
}
