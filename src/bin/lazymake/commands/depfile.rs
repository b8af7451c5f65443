//! `lazymake depfile` command

use anyhow::Result;

use crate::cli::DepfileArgs;
use lazymake::depfile::parser::render;
use lazymake::ops::postprocess_depfile;
use lazymake::util::GlobalContext;

pub fn execute(args: DepfileArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;

    let prereqs = postprocess_depfile(
        ctx.cwd(),
        &args.raw,
        args.source.as_deref(),
        args.output.as_deref(),
    )?;

    if args.output.is_none() {
        print!("{}", render(&prereqs));
    }

    Ok(())
}
