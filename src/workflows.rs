//! Workflows of this repository
//!
//! Regenerate with `cargo run`, verify with `cargo run -- --check`.

use crate::builder::Gen;
use crate::contexts::{github, matrix, secrets};
use crate::expr::AsExpr;
use crate::generate::Definition;

pub const DEFINITIONS: &[Definition] = &[
    crate::definition!("check", check),
    crate::definition!("release", release),
];

fn setup(w: &Gen) {
    w.uses("checkout");
    w.uses("rust-toolchain").with([("components", "rustfmt, clippy")]);
    w.uses("rust-cache");
}

fn check(w: &Gen) {
    w.name("Check");
    w.on().pull_request().branches(["main"]);
    w.on().push().branches(["main"]).ignore_tags(["*"]);
    w.on().workflow_call();
    w.permissions().contents("read");
    w.concurrency(format!("check-{}", github().field("ref")))
        .cancel_in_progress(true);
    w.env([("CARGO_TERM_COLOR", "always")]);

    w.job("lint", |w| {
        setup(w);
        w.run("cargo fmt --all --check");
        w.run("cargo clippy --all-targets -- -D warnings");
    });

    w.job("test", |w| {
        w.strategy()
            .axis("os", ["ubuntu-latest", "macos-latest", "windows-latest"])
            .fail_fast(false);
        w.runs_on(matrix().field("os"));
        setup(w);
        w.run("cargo test --all-targets");
    });

    w.job("generated", |w| {
        setup(w);
        w.run("cargo run -- --check");
    });
}

fn release(w: &Gen) {
    w.name("Release");
    let dry_run = w.on().workflow_dispatch().input();
    dry_run
        .id("dry_run")
        .description("Package without publishing")
        .default(true);
    w.on().push().tags(["v*"]);
    w.permissions().contents("write");

    let checked = w.job("check", |w| {
        w.call("./.github/workflows/check.yml");
    });

    w.job("publish", |w| {
        w.needs([&checked]);
        w.environment("crates-io");
        setup(w);
        let version = w.run("echo \"version=${GITHUB_REF_NAME#v}\" >> $GITHUB_OUTPUT");
        version
            .name("Read version")
            .id("version")
            .returns(["version"]);
        w.run("cargo publish --dry-run");
        w.run("cargo publish")
            .if_(github().field("ref_type").eq("tag").and(dry_run.as_expr().not()))
            .env([("CARGO_REGISTRY_TOKEN", secrets().field("CARGO_REGISTRY_TOKEN"))]);
        w.outputs_of(&version);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::generate::Generator;

    fn generator() -> Generator {
        let config = Config::parse(include_str!("../gh-gen.yml")).unwrap();
        Generator::from_config(&config).unwrap()
    }

    #[test]
    fn test_definitions_build() {
        let generator = generator();
        for definition in DEFINITIONS {
            if let Err(e) = generator.render(definition) {
                panic!("{} failed: {e}", definition.id);
            }
        }
    }

    #[test]
    fn test_committed_workflows_are_current() {
        let generator = generator();
        let committed = [
            include_str!("../.github/workflows/check.yml"),
            include_str!("../.github/workflows/release.yml"),
        ];
        for (definition, committed) in DEFINITIONS.iter().zip(committed) {
            assert_eq!(generator.render(definition).unwrap(), committed, "{}", definition.id);
        }
    }

    #[test]
    fn test_check_workflow() {
        let out = generator().render(&DEFINITIONS[0]).unwrap();
        assert!(out.starts_with("# generated from workflows.rs::check\nname: Check\n"));
        assert!(out.contains("    runs-on: ${{ matrix.os }}\n"));
        assert!(out.contains("    - name: Install Rust\n      uses: dtolnay/rust-toolchain@stable\n"));
        assert!(out.contains("group: check-${{ github.ref }}"));
    }

    #[test]
    fn test_release_workflow() {
        let out = generator().render(&DEFINITIONS[1]).unwrap();
        assert!(out.contains("  check:\n    uses: ./.github/workflows/check.yml\n"));
        assert!(out.contains("  publish:\n    needs: [check]\n"));
        assert!(out.contains("    - if: github.ref_type == 'tag' && !inputs.dry_run\n      run: cargo publish\n"));
        assert!(out.contains("version: ${{ steps.version.outputs.version }}"));
    }
}
