use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use drupal_theme_build::compiler::{compile_all, Prefixer};
use drupal_theme_build::config::{BuildConfig, OutputStyle};
use drupal_theme_build::imagemin::minify_svg;
use drupal_theme_build::probe::{probe, Candidate, FsInspector};
use drupal_theme_build::resolver::{ResolveArgs, Resolver};
use drupal_theme_build::theme::{theme_candidates, ThemeName};

/// Create a Drupal project with one theme under `web/themes/custom`
fn create_project(dir: &TempDir, partials: usize) -> PathBuf {
    let root = dir.path().join("project");
    let theme = root.join("web/themes/custom/bench");
    let scss = theme.join("scss");
    fs::create_dir_all(scss.join("components")).unwrap();
    fs::create_dir_all(theme.join("css")).unwrap();
    fs::create_dir_all(theme.join("templates")).unwrap();
    fs::create_dir_all(root.join("tools")).unwrap();

    let mut style = String::from("$brand: #0678be;\n");
    for i in 0..partials {
        fs::write(
            scss.join("components").join(format!("_c{i}.scss")),
            format!(".c{i} {{ color: $brand; .inner {{ margin: {i}px; }} }}\n"),
        )
        .unwrap();
        style.push_str(&format!("@import 'components/c{i}';\n"));
    }
    fs::write(scss.join("style.scss"), style).unwrap();

    root
}

fn config_for(root: &Path) -> BuildConfig {
    let args = ResolveArgs {
        theme: Some("bench".to_string()),
        root: Some(root.to_path_buf()),
        ..Default::default()
    };
    Resolver::new(FsInspector, root.join("tools"))
        .resolve(&args)
        .unwrap()
}

/// Benchmark first-match probing across the conventional layouts
fn bench_probe(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let root = create_project(&temp, 1);
    let name = ThemeName::parse("bench").unwrap();
    let candidates: Vec<Candidate> = theme_candidates(&root, &name);

    c.bench_function("probe_theme_layouts", |b| {
        b.iter(|| probe(&FsInspector, black_box(&candidates)))
    });
}

/// Benchmark full configuration resolution
fn bench_resolve(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let root = create_project(&temp, 1);

    c.bench_function("resolve_convention", |b| {
        b.iter(|| config_for(black_box(&root)))
    });
}

/// Benchmark compilation with different partial counts
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_all");
    let prefixer = Prefixer::disabled();

    for partials in [10, 50, 200].iter() {
        let temp = TempDir::new().unwrap();
        let root = create_project(&temp, *partials);
        let mut config = config_for(&root);
        config.output_style = OutputStyle::Compressed;

        group.throughput(Throughput::Elements(*partials as u64));
        group.bench_with_input(BenchmarkId::from_parameter(partials), partials, |b, _| {
            b.iter(|| compile_all(black_box(&config), &prefixer))
        });
    }

    group.finish();
}

/// Benchmark in-process SVG minification
fn bench_minify_svg(c: &mut Criterion) {
    let mut svg = String::from(
        r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="x">"#,
    );
    for i in 0..500 {
        svg.push_str(&format!(
            "\n  <!-- shape {i} -->\n  <rect inkscape:label=\"r{i}\" x=\"{i}\" y=\"0\" width=\"1\" height=\"1\"/>"
        ));
    }
    svg.push_str("\n</svg>\n");

    c.bench_function("minify_svg_500_shapes", |b| {
        b.iter(|| minify_svg(black_box(&svg)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_probe,
    bench_resolve,
    bench_compile,
    bench_minify_svg,
);
criterion_main!(benches);
