//! `wpsync backup <site>` — back up one site.

use super::{Ctx, preflight, require_selection};
use crate::{cli::Selection, transport::Connection};

pub fn run(ctx: &Ctx, site_name: &str, select: Selection) -> anyhow::Result<()> {
    let site = ctx.config.site_or_err(site_name)?;
    require_selection(select)?;
    preflight(&[site])?;

    let conn = Connection::open(site)?;
    crate::backup::backup(ctx.workdir, site, &conn, ctx.log, ctx.quiet, select)?;
    Ok(())
}
