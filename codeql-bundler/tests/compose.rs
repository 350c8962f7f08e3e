//! End-to-end composition tests against a synthetic bundle/workspace tree,
//! using the `codeql-stub` script (see `tests/fixtures/codeql-stub/`) in
//! place of the real `codeql` binary. Per spec.md §9's testing guidance,
//! these fixture a minimal bundle on disk rather than mocking the CLI
//! Adapter itself.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};

use codeql_bundler::compose::{compose, ComposeOptions};

fn stub_codeql_path() -> Utf8PathBuf {
    Utf8PathBuf::from(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/fixtures/codeql-stub/codeql"
    ))
}

fn write_file(path: &Utf8Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A bundle with one standard library pack, `codeql/cpp-all`, and no
/// `Customizations.qll` of its own yet.
fn build_minimal_bundle(root: &Utf8Path) {
    let exe = root.join("codeql");
    std::fs::copy(stub_codeql_path(), &exe).unwrap();
    let mut perms = std::fs::metadata(&exe).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&exe, perms).unwrap();

    // Platform detection looks for `cpp/tools/<platform>`.
    std::fs::create_dir_all(root.join("cpp/tools/linux64")).unwrap();

    let pack_dir = root.join("qlpacks/codeql/cpp-all/0.4.1");
    write_file(
        &pack_dir.join("qlpack.yml"),
        "name: codeql/cpp-all\nversion: 0.4.1\nlibrary: true\ndependencies: {}\n",
    );
    write_file(
        &pack_dir.join("cpp.qll"),
        "/** The C++ standard library. */\nimport cpp.semmle.Foo\n",
    );
}

/// A workspace containing a single customization pack targeting
/// `codeql/cpp-all`.
fn build_customization_workspace(root: &Utf8Path) {
    write_file(&root.join("codeql-workspace.yml"), "provide:\n  - .\n");

    let pack_dir = root.join("cpp-queries-customizations");
    write_file(
        &pack_dir.join("qlpack.yml"),
        "name: acme/cpp-queries-customizations\n\
         version: 1.0.0\n\
         library: true\n\
         dependencies:\n  \"codeql/cpp-all\": \"^0.4.0\"\n",
    );
    write_file(
        &pack_dir
            .join("acme")
            .join("cpp_queries_customizations")
            .join("Customizations.qll"),
        "/** Extra predicates for cpp-all. */\n",
    );
}

fn extract(archive_path: &Utf8Path, dest: &Utf8Path) {
    let file = std::fs::File::open(archive_path).unwrap();
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    tar.unpack(dest).unwrap();
}

#[test]
fn customization_pack_rewrites_stdlib_and_strips_own_dependency() {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(tmp.path()).unwrap();

    let bundle_dir = root.join("bundle");
    build_minimal_bundle(&bundle_dir);

    let workspace_dir = root.join("workspace");
    build_customization_workspace(&workspace_dir);

    let output_archive = root.join("out.tar.gz");
    let options = ComposeOptions {
        bundle_path: bundle_dir,
        output_path: output_archive.clone(),
        workspace_path: workspace_dir,
        packs: vec![],
        platforms: vec![],
        no_precompile: false,
        code_scanning_config: None,
    };

    compose(&options).expect("composition should succeed");

    let extracted = root.join("extracted");
    extract(&output_archive, &extracted);

    // Property 3 (spec.md §8): the installed customization pack has no
    // dependencies left.
    let custom_manifest = std::fs::read_to_string(
        extracted
            .join("codeql/qlpacks/acme/cpp-queries-customizations/1.0.0/qlpack.yml"),
    )
    .expect("customization pack should be installed");
    assert!(custom_manifest.contains("dependencies: {}"));
    assert!(!custom_manifest.contains("codeql/cpp-all"));

    // Property 2: the rewritten stdlib manifest pins the customization
    // pack's exact version.
    let stdlib_manifest = std::fs::read_to_string(
        extracted.join("codeql/qlpacks/codeql/cpp-all/0.4.1/qlpack.yml"),
    )
    .expect("stdlib pack should still be installed");
    assert!(stdlib_manifest.contains("acme/cpp-queries-customizations: 1.0.0"));

    // Customizations.qll was synthesized and imports the customization pack.
    let customizations_qll = std::fs::read_to_string(
        extracted.join("codeql/qlpacks/codeql/cpp-all/0.4.1/Customizations.qll"),
    )
    .expect("Customizations.qll should have been synthesized");
    assert!(customizations_qll
        .contains("import acme.cpp_queries_customizations.Customizations"));

    // cpp.qll now imports Customizations ahead of its original import.
    let cpp_qll = std::fs::read_to_string(
        extracted.join("codeql/qlpacks/codeql/cpp-all/0.4.1/cpp.qll"),
    )
    .unwrap();
    let customizations_line = cpp_qll
        .lines()
        .position(|l| l == "import Customizations")
        .expect("cpp.qll should import Customizations");
    let original_import_line = cpp_qll
        .lines()
        .position(|l| l == "import cpp.semmle.Foo")
        .expect("cpp.qll should keep its original import");
    assert!(customizations_line < original_import_line);
}

#[test]
fn missing_dependency_fails_composition_before_any_archive_is_written() {
    let tmp = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(tmp.path()).unwrap();

    let bundle_dir = root.join("bundle");
    build_minimal_bundle(&bundle_dir);

    let workspace_dir = root.join("workspace");
    write_file(&workspace_dir.join("codeql-workspace.yml"), "provide:\n  - .\n");
    let pack_dir = workspace_dir.join("broken-pack");
    write_file(
        &pack_dir.join("qlpack.yml"),
        "name: acme/broken\n\
         version: 1.0.0\n\
         library: false\n\
         dependencies:\n  \"codeql/does-not-exist\": \"^1.0.0\"\n",
    );

    let output_archive = root.join("out.tar.gz");
    let options = ComposeOptions {
        bundle_path: bundle_dir,
        output_path: output_archive.clone(),
        workspace_path: workspace_dir,
        packs: vec![],
        platforms: vec![],
        no_precompile: false,
        code_scanning_config: None,
    };

    let err = compose(&options).expect_err("an unresolvable dependency must fail composition");
    assert!(matches!(
        err,
        codeql_bundler::errors::BundleError::ResolverFailure { .. }
    ));
    assert!(!output_archive.exists());
}
