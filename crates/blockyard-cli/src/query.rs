//! Implementation of the `blockyard resolve` and `blockyard search` commands.

use crate::context::Context;
use anyhow::{Context as _, Result};
use blockyard_pkg::{
    BlockIdentifier, BlockReference, Candidate, Eligibility, Selection, ShortcutResolver,
};

/// Options for the resolve command.
#[derive(Debug, Default)]
pub struct ResolveOptions {
    /// Block reference, possibly abbreviated.
    pub reference: String,
    /// Accept blocks that only exist in the available tier.
    pub any_tier: bool,
}

/// Resolve a reference to one catalog block and pick its version.
pub fn resolve_reference(ctx: &Context, options: &ResolveOptions) -> Result<Selection> {
    let reference = BlockReference::parse(&options.reference)
        .with_context(|| format!("invalid block reference '{}'", options.reference))?;
    let eligibility = if options.any_tier {
        Eligibility::Any
    } else {
        Eligibility::Buildable
    };

    let selection = ShortcutResolver::new(&ctx.catalog)
        .with_eligibility(eligibility)
        .select(&reference, ctx.settings.precedence())?;
    Ok(selection)
}

/// Catalog blocks matching `pattern`, or every block when absent.
pub fn search(ctx: &Context, pattern: Option<&str>) -> Result<Vec<Candidate>> {
    let Some(pattern) = pattern else {
        return Ok(ctx
            .catalog
            .blocks()
            .map(|id| Candidate {
                id: id.clone(),
                tiers: ctx.catalog.block_tiers(id),
            })
            .collect());
    };

    let pattern = BlockIdentifier::parse(pattern)
        .with_context(|| format!("invalid block identifier '{pattern}'"))?;
    Ok(ShortcutResolver::new(&ctx.catalog).search(&pattern))
}

/// Print a selection the way `resolve` reports it.
pub fn print_selection(selection: &Selection) {
    match &selection.location {
        Some(location) => println!("{selection} {}", location.display()),
        None => println!("{selection}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockyard_pkg::{Catalog, ResolveError, Settings, Tier, Version};

    fn context() -> Context {
        let catalog = Catalog::parse(
            r#"
[[block]]
vendor = "acme"
library = "math"
name = "adder"
version = "1.0.0"
tiers = ["installed"]
path = "/cache/adder-1.0.0"

[[block]]
vendor = "acme"
library = "math"
name = "adder"
version = "1.2.0"
tiers = ["installed", "downloaded"]
path = "/work/adder"

[[block]]
vendor = "beta"
library = "dsp"
name = "fir"
version = "0.3.0"
tiers = ["available"]
"#,
        )
        .unwrap();
        Context {
            settings: Settings::default(),
            catalog,
        }
    }

    #[test]
    fn test_resolve_shortcut() {
        let ctx = context();
        let options = ResolveOptions {
            reference: "adder@1".to_string(),
            any_tier: false,
        };
        let selection = resolve_reference(&ctx, &options).unwrap();
        assert_eq!(selection.id, BlockIdentifier::qualified("acme", "math", "adder"));
        assert_eq!(selection.version, Version::new(1, 2, 0));
        assert_eq!(selection.tier, Tier::Installed);
    }

    #[test]
    fn test_resolve_available_only() {
        let ctx = context();
        let mut options = ResolveOptions {
            reference: "fir".to_string(),
            any_tier: false,
        };
        let err = resolve_reference(&ctx, &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NotBuildable { .. })
        ));

        options.any_tier = true;
        let selection = resolve_reference(&ctx, &options).unwrap();
        assert_eq!(selection.tier, Tier::Available);
    }

    #[test]
    fn test_search() {
        let ctx = context();
        assert_eq!(search(&ctx, None).unwrap().len(), 2);

        let found = search(&ctx, Some("math.adder")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].tiers.contains(Tier::Downloaded));

        assert!(search(&ctx, Some("a.b.c.d")).is_err());
    }
}
