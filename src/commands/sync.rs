//! `wpsync sync <source> <dest>` — synchronise one site onto another.
//!
//! Sync never transfers source→dest directly. It is exactly
//! backup(source) → backup(dest) → restore(source→dest): the destination
//! backup taken in the middle is the rollback point, so a sync that went
//! wrong can always be restored from. The source connection is closed
//! before the destination one opens — there is never source-side and
//! dest-side work in flight at the same time.

use super::{Ctx, preflight, require_selection};
use crate::{cli::Selection, transport::Connection};

pub fn run(ctx: &Ctx, source_name: &str, dest_name: &str, select: Selection) -> anyhow::Result<()> {
    let source = ctx.config.site_or_err(source_name)?;
    let dest = ctx.config.site_or_err(dest_name)?;
    require_selection(select)?;
    preflight(&[source, dest])?;

    let backup_id = {
        let conn = Connection::open(source)?;
        crate::backup::backup(ctx.workdir, source, &conn, ctx.log, ctx.quiet, select)?
    };

    let conn = Connection::open(dest)?;
    crate::backup::backup(ctx.workdir, dest, &conn, ctx.log, ctx.quiet, select)?;
    crate::restore::restore(
        ctx.workdir,
        source,
        dest,
        &conn,
        ctx.log,
        ctx.quiet,
        &backup_id,
        select,
    )?;
    Ok(())
}
