mod common;

use common::AppFixture;
use pretty_assertions::assert_eq;
use routec_core::table::CommandEntry;
use routec_core::{CacheContext, Compiler, ErrorKind, MemoryCacheStore, RouteTable};

const MAIL: &str = r#"
    <?php
    namespace App\Controllers\Cli;

    use Framework\Console\Command;
    use Framework\Routing\Attributes\Route;

    #[Group('mail')]
    class Mail extends Command
    {
        #[Route('send', group: 'mail', aliases: ['mail:send'])]
        public function send() {}

        #[Route('queue', group: 'mail')]
        public function queue() {}

        #[Route('boot', group: 'mail', middleware: 'global')]
        public function boot() {}

        #[Route('auth', group: 'mail', middleware: 'guard')]
        public function guard() {}

        #[Route('/inbox')]
        public function notForCli() {}
    }
    "#;

fn command(pattern: &str, callback: &str) -> CommandEntry {
    CommandEntry {
        pattern: pattern.to_string(),
        callback: format!("App\\Controllers\\Cli\\Mail::{callback}"),
    }
}

#[test]
fn compiles_command_group() {
    let app = AppFixture::new();
    app.write("Controllers/Cli/Mail.php", MAIL);
    app.write(
        "Controllers/Http/Mail.php",
        r#"
        <?php
        namespace App\Controllers\Http;

        #[Prefix('/mail')]
        class Mail extends Controller {}
        "#,
    );

    let mut compiler = Compiler::new(app.config(), MemoryCacheStore::new());
    let table = compiler.for_cli(&app.app_root(), "mail").expect("compile");

    assert_eq!(table.base_pattern, "mail");
    assert_eq!(
        table.cli.groups["mail"],
        vec![
            command("send", "send"),
            command("mail:send", "send"),
            command("queue", "queue"),
        ]
    );
    assert_eq!(table.cli.middleware["global"], vec![command("boot", "boot")]);
    assert_eq!(table.cli.middleware["mail"], vec![command("auth", "guard")]);
    assert!(table.http.is_empty());
    assert_eq!(compiler.metrics().files_scanned, 1);
    assert_eq!(compiler.cache().backend().keys(CacheContext::Cli), vec!["mail".to_string()]);
}

#[test]
fn cached_group_short_circuits_the_walk() {
    let app = AppFixture::new();
    app.write("Controllers/Cli/Mail.php", MAIL);

    let mut compiler = Compiler::with_fs_cache(app.config().with_environment("local"));
    let first = compiler.for_cli(&app.app_root(), "mail").expect("compile");
    let cached = std::fs::read_to_string(app.cache_root().join("routes/cli/mail.json")).expect("cache file");
    assert!(!cached.contains('\n'));

    app.remove_app();
    let second = compiler.for_cli(&app.app_root(), "mail").expect("cached");
    assert_eq!(second, first);
    assert!(compiler.metrics().cache_hit);
}

#[test]
fn unknown_group_yields_empty_table() {
    let app = AppFixture::new();
    app.write("Controllers/Cli/Mail.php", MAIL);

    let mut compiler = Compiler::new(app.config(), MemoryCacheStore::new());
    let table = compiler.for_cli(&app.app_root(), "report").expect("compile");
    assert_eq!(table, RouteTable::default());
}

#[test]
fn invalid_group_name_is_fatal() {
    let app = AppFixture::new();
    app.write(
        "Controllers/Cli/Report.php",
        r#"
        <?php
        namespace App\Controllers\Cli;

        #[Group('Reports!')]
        class Report extends Command {}
        "#,
    );

    let mut compiler = Compiler::new(app.config(), MemoryCacheStore::new());
    let err = compiler.for_cli(&app.app_root(), "report").expect_err("bad group");
    assert_eq!(err.kind(), ErrorKind::InvalidGroupName);
    assert!(err.is_configuration());
}

#[test]
fn http_middleware_on_console_route_is_fatal() {
    let app = AppFixture::new();
    app.write(
        "Controllers/Cli/Sync.php",
        r#"
        <?php
        namespace App\Controllers\Cli;

        #[Group('sync')]
        class Sync extends Command
        {
            #[Route('run', group: 'sync', middleware: 'before')]
            public function run() {}
        }
        "#,
    );

    let mut compiler = Compiler::new(app.config(), MemoryCacheStore::new());
    let err = compiler.for_cli(&app.app_root(), "sync").expect_err("invalid middleware");
    assert_eq!(err.kind(), ErrorKind::InvalidMiddleware);
}
