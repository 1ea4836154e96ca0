//! End-to-end tests: catalog snapshot on disk, blocks on disk, blueprint out.

use blockyard_pkg::{
    Block, BuildError, BuildRequest, Catalog, FsLoader, GraphError, Planner, ResolveError,
    Settings, Version,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn counter_block(dir: &Path, version: &str) {
    write(
        &dir.join("Block.toml"),
        &format!("[block]\nname = \"counter\"\nlibrary = \"math\"\nvendor = \"acme\"\nversion = \"{version}\"\n"),
    );
    write(
        &dir.join("rtl/counter.vhd"),
        "entity counter is\n  port (clk : in bit);\nend entity;\n\narchitecture rtl of counter is\nbegin\nend architecture;\n",
    );
}

fn app_block(dir: &Path, requires: &[&str]) {
    let requires: Vec<String> = requires.iter().map(|r| format!("\"{r}\"")).collect();
    write(
        &dir.join("Block.toml"),
        &format!(
            "[block]\nname = \"app\"\nlibrary = \"soc\"\nvendor = \"acme\"\nrequires = [{}]\n",
            requires.join(", ")
        ),
    );
    write(
        &dir.join("top.vhd"),
        "entity top is\n  port (clk : in bit);\nend entity;\n\narchitecture rtl of top is\nbegin\n  u0 : entity math.counter port map (clk);\nend architecture;\n",
    );
    write(
        &dir.join("sim/top_tb.vhd"),
        "entity top_tb is\nend entity;\n\narchitecture sim of top_tb is\n  signal clk : bit;\nbegin\n  dut : entity work.top port map (clk);\nend architecture;\n",
    );
}

const CATALOG: &str = r#"
[[block]]
vendor = "acme"
library = "math"
name = "counter"
version = "1.0.0"
tiers = ["installed"]
path = "cache/counter-1.0.0"

[[block]]
vendor = "acme"
library = "math"
name = "counter"
version = "1.1.0"
tiers = ["installed"]
path = "cache/counter-1.1.0"

[[block]]
vendor = "acme"
library = "math"
name = "counter"
version = "2.0.0"
tiers = ["available"]
"#;

fn workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(&tmp.path().join("catalog.toml"), CATALOG);
    counter_block(&tmp.path().join("cache/counter-1.0.0"), "1.0.0");
    counter_block(&tmp.path().join("cache/counter-1.1.0"), "1.1.0");
    tmp
}

#[test]
fn test_export_with_required_block() {
    let tmp = workspace();
    let app = tmp.path().join("app");
    app_block(&app, &["math.counter@1"]);

    let catalog = Catalog::from_path(tmp.path().join("catalog.toml")).unwrap();
    let settings = Settings::default();
    let block = Block::load(&app).unwrap();
    let request = BuildRequest::new().with_manifest_defaults(&block.manifest);

    let (plan, path) = Planner::new(&catalog, &FsLoader, &settings)
        .export(block.to_loaded().unwrap(), &request)
        .unwrap();

    assert_eq!(plan.top.to_string(), "acme.soc.app:top");
    let counter = plan
        .graph
        .block_order()
        .into_iter()
        .find(|b| b.id.name.as_str() == "counter")
        .unwrap();
    assert_eq!(counter.version, Some(Version::new(1, 1, 0)));

    let lib = tmp.path().join("cache/counter-1.1.0/rtl/counter.vhd");
    let expected = format!("@VHDL-LIB {}\n@VHDL-SRC-TOP top.vhd\n", lib.display());
    assert_eq!(path, app.join("build/blueprint"));
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);
}

#[test]
fn test_export_with_bench_and_labels() {
    let tmp = workspace();
    let app = tmp.path().join("app");
    app_block(&app, &["math.counter@1.0"]);
    write(&app.join("pins.xdc"), "");
    write(&tmp.path().join("cache/counter-1.0.0/counter.xdc"), "");

    let settings = Settings::parse("[label.recursive]\nXDC = \"*.xdc\"\n", tmp.path()).unwrap();
    let catalog = Catalog::from_path(tmp.path().join("catalog.toml")).unwrap();
    let block = Block::load(&app).unwrap();
    let request = BuildRequest::new().include_bench(true);

    let plan = Planner::new(&catalog, &FsLoader, &settings)
        .plan(block.to_loaded().unwrap(), &request)
        .unwrap();

    assert_eq!(plan.bench.as_ref().unwrap().unit.as_str(), "top_tb");
    let lines: Vec<String> = plan.blueprint.entries().iter().map(ToString::to_string).collect();
    let lib_root = tmp.path().join("cache/counter-1.0.0");
    assert_eq!(
        lines,
        vec![
            format!("@VHDL-LIB {}", lib_root.join("rtl/counter.vhd").display()),
            "@VHDL-SRC-TOP top.vhd".to_string(),
            "@VHDL-SIM-TOP sim/top_tb.vhd".to_string(),
            format!("@XDC {}", lib_root.join("counter.xdc").display()),
            "@XDC pins.xdc".to_string(),
        ]
    );
}

#[test]
fn test_library_search_without_requires() {
    let tmp = workspace();
    let app = tmp.path().join("app");
    app_block(&app, &[]);

    let catalog = Catalog::from_path(tmp.path().join("catalog.toml")).unwrap();
    let settings = Settings::default();
    let block = Block::load(&app).unwrap();

    let plan = Planner::new(&catalog, &FsLoader, &settings)
        .plan(block.to_loaded().unwrap(), &BuildRequest::new())
        .unwrap();
    let counter = plan.graph.block_order()[0];
    assert_eq!(counter.version, Some(Version::new(1, 1, 0)));
    assert_eq!(
        plan.graph.render_tree(&plan.top),
        "\\- soc.top\n   \\- math.counter\n"
    );
}

#[test]
fn test_available_only_requirement_fails() {
    let tmp = workspace();
    let app = tmp.path().join("app");
    app_block(&app, &["math.counter@2"]);

    let catalog = Catalog::from_path(tmp.path().join("catalog.toml")).unwrap();
    let settings = Settings::default();
    let block = Block::load(&app).unwrap();

    let err = Planner::new(&catalog, &FsLoader, &settings)
        .plan(block.to_loaded().unwrap(), &BuildRequest::new())
        .unwrap_err();
    assert!(matches!(err, BuildError::Graph(GraphError::Requirement { .. })));
}

#[test]
fn test_ambiguous_library_providers() {
    let tmp = workspace();
    let catalog = format!(
        "{CATALOG}\n[[block]]\nvendor = \"beta\"\nlibrary = \"math\"\nname = \"counter2\"\nversion = \"0.1.0\"\ntiers = [\"installed\"]\npath = \"cache/beta-counter\"\n"
    );
    write(&tmp.path().join("catalog.toml"), &catalog);
    counter_block(&tmp.path().join("cache/beta-counter"), "0.1.0");
    fs::write(
        tmp.path().join("cache/beta-counter/Block.toml"),
        "[block]\nname = \"counter2\"\nlibrary = \"math\"\nvendor = \"beta\"\nversion = \"0.1.0\"\n",
    )
    .unwrap();

    let app = tmp.path().join("app");
    app_block(&app, &[]);

    let catalog = Catalog::from_path(tmp.path().join("catalog.toml")).unwrap();
    let settings = Settings::default();
    let block = Block::load(&app).unwrap();

    let err = Planner::new(&catalog, &FsLoader, &settings)
        .plan(block.to_loaded().unwrap(), &BuildRequest::new())
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::Graph(GraphError::Resolve(ResolveError::AmbiguousIdentifier { .. }))
    ));
}
