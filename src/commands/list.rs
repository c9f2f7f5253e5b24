//! `wpsync list` — list existing backup sets.

use super::Ctx;
use crate::{cli::Selection, list_backups::list_backups};

pub fn run(ctx: &Ctx, site_name: Option<&str>, select: Selection) -> anyhow::Result<()> {
    let (sites, single) = match site_name {
        Some(name) => {
            let site = ctx.config.site_or_err(name)?;
            (vec![(site.name.clone(), site.fs_safe_name())], true)
        }
        None => (
            ctx.config
                .sites
                .values()
                .map(|s| (s.name.clone(), s.fs_safe_name()))
                .collect(),
            false,
        ),
    };

    for line in list_backups(ctx.workdir, &sites, single, select) {
        println!("{line}");
    }
    Ok(())
}
