// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Args;
use shield_agent::keyfile;

#[derive(Args)]
pub struct KeygenArgs {
    /// Where to write the keypair; the public key goes to `<OUT>.pub`
    #[arg(short, long)]
    pub out: PathBuf,

    /// Comment appended to the public key line
    #[arg(long, default_value = "")]
    pub comment: String,

    /// Overwrite an existing key file
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: KeygenArgs) -> anyhow::Result<()> {
    let keypair = keyfile::generate(&args.out, &args.comment, args.force)?;
    eprintln!(
        "wrote {} and {}",
        args.out.display(),
        keyfile::public_path(&args.out).display()
    );
    println!("{}", keypair.public());
    Ok(())
}
