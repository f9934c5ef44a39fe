#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{stack_layout, write_script};
use tempfile::tempdir;
use wamp::{
    constants::ServiceKind,
    error::StackError,
    runtime::{ApacheLayout, StackLayout},
    site::SiteProvisioner,
    stack::Stack,
};

const APACHE: &str = "httpd-2.4";
const MYSQL: &str = "mariadb-11";
const PHP: &str = "php-8.3.8-nts";

struct Fixture {
    _temp: tempfile::TempDir,
    layout: StackLayout,
    apache: ApacheLayout,
    php_dir: std::path::PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempdir().expect("failed to create tempdir");
        let layout = stack_layout(&temp.path().join("wamp"), APACHE, MYSQL);
        let php_dir = layout.install_dir(ServiceKind::Php, PHP);
        fs::create_dir_all(&php_dir).expect("failed to create php dir");
        let apache = ApacheLayout::new(layout.install_dir(ServiceKind::Apache, APACHE));
        Self {
            _temp: temp,
            layout,
            apache,
            php_dir,
        }
    }

    fn provisioner(&self) -> SiteProvisioner {
        SiteProvisioner::new(&self.layout, self.apache.root())
    }

    /// Installs a certificate tool that issues files into its working dir
    /// and logs its invocations.
    fn install_mkcert(&self) -> std::path::PathBuf {
        let log = self.layout.root().join("mkcert.log");
        write_script(
            &self.layout.mkcert_path(),
            &format!(
                "printf '%s\\n' \"$*\" >> \"{}\"\ntouch \"./$1.pem\" \"./$1-key.pem\"",
                log.display()
            ),
        );
        log
    }

    /// Installs a hosts editor that records its invocations.
    fn install_hostsrw(&self, body: &str) -> std::path::PathBuf {
        let log = self.layout.root().join("hostsrw.log");
        write_script(
            &self.layout.hostsrw_path(),
            &format!("printf '%s\\n' \"$*\" >> \"{}\"\n{body}", log.display()),
        );
        log
    }
}

#[test]
fn add_creates_doc_root_and_vhost() {
    let fixture = Fixture::new();
    let sites = fixture.provisioner();

    let site = sites
        .add("example.test", &fixture.php_dir, false)
        .expect("site add failed");

    assert!(site.doc_root.is_dir());
    assert_eq!(site.doc_root, fixture.layout.www_dir().join("example.test"));
    assert_eq!(site.fragment, fixture.apache.site_fragment("example.test"));
    let vhost = fs::read_to_string(&site.fragment).expect("vhost missing");
    assert!(vhost.contains("example.test"));
    assert!(vhost.contains(&fixture.php_dir.display().to_string()));
    assert!(vhost.contains("<VirtualHost *:80>"));
    assert!(!vhost.contains("*:443"));
    assert_eq!(site.tls, None);
}

#[test]
fn second_add_reports_existing_site() {
    let fixture = Fixture::new();
    let sites = fixture.provisioner();
    sites
        .add("example.test", &fixture.php_dir, false)
        .expect("site add failed");
    let before = fs::read_to_string(fixture.apache.site_fragment("example.test"))
        .expect("vhost missing");

    let err = sites
        .add("example.test", &fixture.php_dir, false)
        .expect_err("second add should fail");
    assert!(matches!(err, StackError::SiteExists { .. }));
    assert_eq!(
        fs::read_to_string(fixture.apache.site_fragment("example.test")).expect("vhost missing"),
        before
    );
}

#[test]
fn leftover_vhost_alone_blocks_add() {
    let fixture = Fixture::new();
    let fragment = fixture.apache.site_fragment("example.test");
    fs::create_dir_all(fixture.apache.sites_enabled_dir()).expect("failed to create sites dir");
    fs::write(&fragment, "# hand written").expect("failed to write vhost");

    let err = fixture
        .provisioner()
        .add("example.test", &fixture.php_dir, false)
        .expect_err("add should fail");
    assert!(matches!(err, StackError::SiteExists { ref path, .. } if path == &fragment));
    assert!(!fixture.layout.www_dir().join("example.test").exists());
}

#[test]
fn missing_runtime_is_rejected_before_any_write() {
    let fixture = Fixture::new();
    let missing = fixture.layout.install_dir(ServiceKind::Php, "php-5.6");

    let err = fixture
        .provisioner()
        .add("example.test", &missing, false)
        .expect_err("add should fail");
    assert!(matches!(err, StackError::RuntimeMissing { .. }));
    assert!(!fixture.layout.www_dir().join("example.test").exists());
    assert!(!fixture.apache.site_fragment("example.test").exists());
}

#[test]
fn tls_site_gets_certificate_and_https_block() {
    let fixture = Fixture::new();
    let log = fixture.install_mkcert();

    let site = fixture
        .provisioner()
        .add("secure.test", &fixture.php_dir, true)
        .expect("tls site add failed");

    let tls = site.tls.expect("tls material missing");
    assert_eq!(tls.cert, fixture.apache.site_cert("secure.test"));
    assert!(tls.cert.is_file());
    assert!(tls.key.is_file());
    let vhost = fs::read_to_string(&site.fragment).expect("vhost missing");
    assert!(vhost.contains("<VirtualHost *:443>"));
    assert!(vhost.contains(&tls.cert.display().to_string()));
    assert!(vhost.contains(&tls.key.display().to_string()));
    assert_eq!(
        fs::read_to_string(log).expect("mkcert log missing").trim(),
        "secure.test"
    );
}

#[test]
fn existing_certificate_blocks_tls_site() {
    let fixture = Fixture::new();
    fixture.install_mkcert();
    let cert = fixture.apache.site_cert("secure.test");
    fs::create_dir_all(fixture.apache.sites_ssl_dir()).expect("failed to create ssl dir");
    fs::write(&cert, "old cert").expect("failed to write cert");

    let err = fixture
        .provisioner()
        .add("secure.test", &fixture.php_dir, true)
        .expect_err("add should fail");
    assert!(matches!(err, StackError::CertExists { ref path } if path == &cert));
    assert_eq!(fs::read_to_string(&cert).expect("cert missing"), "old cert");
    assert!(!fixture.layout.www_dir().join("secure.test").exists());
}

#[test]
fn failing_certificate_tool_aborts_add() {
    let fixture = Fixture::new();
    write_script(&fixture.layout.mkcert_path(), "echo 'CA not installed' >&2\nexit 1");

    let err = fixture
        .provisioner()
        .add("secure.test", &fixture.php_dir, true)
        .expect_err("add should fail");
    assert!(matches!(err, StackError::Subprocess { .. }));
    assert!(!fixture.apache.site_fragment("secure.test").exists());
}

#[test]
fn hosts_registration_is_best_effort() {
    let fixture = Fixture::new();
    assert!(!fixture.layout.hostsrw_path().exists());

    fixture
        .provisioner()
        .add("example.test", &fixture.php_dir, false)
        .expect("add without hosts editor should succeed");
    assert!(fixture.apache.site_fragment("example.test").is_file());
}

#[test]
fn hosts_entry_is_added_and_removed() {
    let fixture = Fixture::new();
    let log = fixture.install_hostsrw("exit 0");
    let sites = fixture.provisioner();

    sites
        .add("example.test", &fixture.php_dir, false)
        .expect("site add failed");
    sites.remove("example.test").expect("site rm failed");

    let calls = fs::read_to_string(log).expect("hostsrw log missing");
    assert_eq!(
        calls.lines().collect::<Vec<_>>(),
        ["exists example.test", "add example.test", "rm example.test"]
    );
}

#[test]
fn remove_deletes_every_artifact_and_is_repeatable() {
    let fixture = Fixture::new();
    fixture.install_mkcert();
    let sites = fixture.provisioner();
    sites
        .add("secure.test", &fixture.php_dir, true)
        .expect("site add failed");
    fs::create_dir_all(fixture.apache.logs_dir()).expect("failed to create logs dir");
    fs::write(fixture.apache.site_access_log("secure.test"), "GET /").expect("failed to write log");
    fs::write(fixture.layout.www_dir().join("secure.test/index.php"), "<?php")
        .expect("failed to write index");

    sites.remove("secure.test").expect("site rm failed");
    for path in [
        fixture.layout.www_dir().join("secure.test"),
        fixture.apache.site_fragment("secure.test"),
        fixture.apache.site_cert("secure.test"),
        fixture.apache.site_key("secure.test"),
        fixture.apache.site_access_log("secure.test"),
    ] {
        assert!(!path.exists(), "{path:?} survived removal");
    }

    sites.remove("secure.test").expect("second site rm failed");
}

#[test]
fn invalid_names_touch_nothing() {
    let fixture = Fixture::new();
    let sites = fixture.provisioner();

    for name in ["../escape", "localhost", "bad name.test"] {
        assert!(matches!(
            sites.add(name, &fixture.php_dir, false),
            Err(StackError::InvalidSiteName(_))
        ));
        assert!(matches!(sites.remove(name), Err(StackError::InvalidSiteName(_))));
    }
    assert!(!fixture.layout.www_dir().exists());
}

#[test]
fn stack_binds_site_to_requested_runtime() {
    let fixture = Fixture::new();
    let older = fixture.layout.install_dir(ServiceKind::Php, "php-8.2.20-nts");
    fs::create_dir_all(&older).expect("failed to create php dir");
    let stack = Stack::new(fixture.layout.clone());

    let site = stack
        .site_add("legacy.test", Some("8.2"), false)
        .expect("site add failed");
    assert_eq!(site.php_dir, older);

    let err = stack
        .site_add("modern.test", None, false)
        .expect_err("default runtime is not installed");
    assert!(matches!(err, StackError::RuntimeMissing { .. }));

    stack.site_rm("legacy.test").expect("site rm failed");
    assert!(!fixture.apache.site_fragment("legacy.test").exists());
}
