use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use routec_cli::{CacheOptions, ConfigOptions, RoutecOptions, Target, run_main};
use tempfile::TempDir;
use textwrap::dedent;

fn write(root: &Path, relative: &str, source: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, dedent(source).trim_start()).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let app = dir.path().join("app");
    write(
        &app,
        "Controllers/Http/Blog.php",
        r#"
        <?php
        namespace App\Controllers\Http;

        #[Prefix('/blog')]
        class Blog extends Controller
        {
            #[Route('/archive')]
            public function archive() {}
        }
        "#,
    );
    write(
        &app,
        "Controllers/Cli/Mail.php",
        r#"
        <?php
        namespace App\Controllers\Cli;

        #[Group('mail')]
        class Mail extends Command
        {
            #[Route('send', group: 'mail')]
            public function send() {}
        }
        "#,
    );
    fs::write(
        dir.path().join("routec.toml"),
        format!("cache_root = {:?}\n", dir.path().join("cache").display().to_string()),
    )
    .unwrap();
    dir
}

fn options(dir: &TempDir, target: Target, no_cache: bool) -> RoutecOptions {
    RoutecOptions {
        config: ConfigOptions::new().with_config(dir.path().join("routec.toml")),
        cache: CacheOptions::new().with_no_cache(no_cache),
        output: Some(dir.path().join("out.json")),
        target,
    }
}

#[test]
fn http_target_writes_json_and_cache() {
    let dir = fixture();
    let target = Target::Http {
        dir: dir.path().join("app"),
        uri: "/blog/archive".to_string(),
        context: "web".to_string(),
    };
    let rendered = run_main(&options(&dir, target, false)).expect("run");

    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(
        json["http"]["routes"]["GET"][0]["callback"],
        "App\\Controllers\\Http\\Blog::archive"
    );
    assert_eq!(fs::read_to_string(dir.path().join("out.json")).unwrap(), rendered);
    assert!(dir.path().join("cache/routes/http/web/blog.json").is_file());
}

#[test]
fn no_cache_leaves_cache_root_untouched() {
    let dir = fixture();
    let target = Target::Cli {
        dir: dir.path().join("app"),
        command: "mail".to_string(),
    };
    let rendered = run_main(&options(&dir, target, true)).expect("run");
    assert!(rendered.contains("Mail::send"));
    assert!(!dir.path().join("cache").exists());
}

#[test]
fn export_target_lists_both_contexts() {
    let dir = fixture();
    let target = Target::Export {
        dir: dir.path().join("app"),
    };
    let rendered = run_main(&options(&dir, target, false)).expect("run");
    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(json["modules"]["App"]["http"]["blog"][0]["pattern"], "/blog/archive");
    assert_eq!(json["modules"]["App"]["cli"]["mail"][0]["pattern"], "send");
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let opts = RoutecOptions {
        config: ConfigOptions::new().with_config(dir.path().join("missing.toml")),
        cache: CacheOptions::new(),
        output: None,
        target: Target::Export {
            dir: dir.path().to_path_buf(),
        },
    };
    let err = run_main(&opts).expect_err("missing config");
    assert_eq!(err.kind(), routec_core::ErrorKind::FileNotFound);
}
