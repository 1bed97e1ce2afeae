//! Loading Integration Tests
//!
//! Graph discovery, fragment identity, export gating and failure caching.

use spacey_loader::{
    ImportMap, LoadErrorKind, LoadStage, MemoryFetcher, ModuleMapKey, ModuleStatus, Realm,
    ResolveError,
};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn key(text: &str) -> ModuleMapKey {
    ModuleMapKey::parse(text).unwrap()
}

fn realm(fetcher: &Arc<MemoryFetcher>) -> Realm {
    Realm::builder()
        .fetcher(fetcher.clone())
        .base_url(Url::parse("https://x/").unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_fragment_entries_are_singletons() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/app.js",
        "module a { export const x = 1; } import { x } from a; import { x as y } from '#a';",
    );
    let realm = realm(&fetcher);

    // the identifier and the URL form name the same module
    let app = realm.load("./app.js").await.unwrap();
    assert_eq!(
        app.dependencies(),
        vec![key("https://x/app.js#a"), key("https://x/app.js#a")]
    );

    let first = realm.module_map().get(&key("https://x/app.js#a")).unwrap();
    let second = realm.load_key(&key("https://x/app.js#a")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fetcher.fetch_count("https://x/app.js"), 1);
}

#[tokio::test]
async fn test_unrequested_fragments_stay_registered() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/app.js",
        r#"
        module used { export const a = 1; }
        module unused { import { b } from "./never.js"; }
        import { a } from used;
        "#,
    );
    let realm = realm(&fetcher);

    realm.load("./app.js").await.unwrap();

    assert!(realm.is_loaded(&key("https://x/app.js#used")));
    assert_eq!(realm.status(&key("https://x/app.js#unused")), Some(ModuleStatus::Registered));
    assert_eq!(fetcher.fetch_count("https://x/never.js"), 0);
}

#[tokio::test]
async fn test_export_gating_across_resources() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/app.js",
        r#"
        module countBlock { export function count() {} }
        export module uppercaseBlock { export function uppercase(s) {} }
        export module outer { module inner { export const v = 1; } }
        "#,
    );
    fetcher.insert(
        "https://x/good.js",
        "import { uppercase } from './app.js#uppercaseBlock';",
    );
    fetcher.insert("https://x/bad.js", "import { count } from './app.js#countBlock';");
    fetcher.insert("https://x/deep.js", "import { v } from './app.js#outer/inner';");
    let realm = realm(&fetcher);

    realm.load("./good.js").await.unwrap();
    assert!(realm.is_exported(&key("https://x/app.js#uppercaseBlock")));

    let err = realm.load_key(&key("https://x/bad.js")).await.unwrap_err();
    assert_eq!(err.key, key("https://x/bad.js"));
    assert_eq!(err.stage, LoadStage::Resolve);
    assert!(matches!(
        err.kind,
        LoadErrorKind::Resolve(ResolveError::UnboundFragmentReference { .. })
    ));
    assert!(!realm.is_exported(&key("https://x/app.js#countBlock")));
    assert_eq!(realm.status(&key("https://x/app.js#countBlock")), Some(ModuleStatus::Registered));

    // every enclosing fragment must be exported too
    assert!(realm.load_key(&key("https://x/deep.js")).await.is_err());
    assert!(!realm.is_exported(&key("https://x/app.js#outer/inner")));
}

#[tokio::test]
async fn test_non_ascii_fragment_names_across_resources() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/lib.js",
        "export module café { export const menu = 1; }",
    );
    fetcher.insert("https://x/main.js", "import { menu } from './lib.js#café';");
    fetcher.insert("https://x/encoded.js", "import { menu } from './lib.js#caf%C3%A9';");
    let realm = realm(&fetcher);

    let main = realm.load("./main.js").await.unwrap();
    let cafe = key("https://x/lib.js#café");
    assert_eq!(main.dependencies(), vec![cafe.clone()]);
    assert!(realm.is_loaded(&cafe));
    assert!(realm.is_exported(&cafe));

    let encoded = realm.load("./encoded.js").await.unwrap();
    assert_eq!(encoded.dependencies(), vec![cafe]);
    assert_eq!(fetcher.fetch_count("https://x/lib.js"), 1);
}

#[tokio::test]
async fn test_nested_fragment_resolves_against_resource_url() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/lib/y.js",
        r#"
        module a {
          module b {
            import { v } from "./z.js";
            export { v };
          }
          export { v } from b;
        }
        import { v } from a;
        "#,
    );
    fetcher.insert("https://x/lib/z.js", "export const v = 1;");
    let realm = realm(&fetcher);

    realm.load("./lib/y.js").await.unwrap();

    let inner = key("https://x/lib/y.js#a/b");
    assert!(realm.is_loaded(&inner));
    assert_eq!(
        realm.module_map().get(&inner).unwrap().dependencies(),
        vec![key("https://x/lib/z.js")]
    );
    assert_eq!(
        realm.import_meta(&inner).unwrap().url.as_str(),
        "https://x/lib/y.js"
    );
}

#[tokio::test]
async fn test_duplicate_fragment_names_fail_before_dependencies_load() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/dup.js",
        "import './dep.js'; module a {} module a {}",
    );
    fetcher.insert("https://x/dep.js", "export const d = 1;");
    let realm = realm(&fetcher);

    let err = realm.load_key(&key("https://x/dup.js")).await.unwrap_err();
    assert_eq!(err.stage, LoadStage::Extract);
    assert!(matches!(err.kind, LoadErrorKind::Extract(_)));
    assert_eq!(fetcher.fetch_count("https://x/dep.js"), 0);
}

#[tokio::test]
async fn test_concurrent_loads_share_fetches() {
    let fetcher = Arc::new(MemoryFetcher::new().with_delay(Duration::from_millis(20)));
    fetcher.insert("https://x/a.js", "import { s } from './shared.js';");
    fetcher.insert("https://x/b.js", "import { s } from './shared.js';");
    fetcher.insert("https://x/shared.js", "export const s = 1;");
    let realm = Arc::new(realm(&fetcher));

    let tasks: Vec<_> = ["https://x/a.js", "https://x/b.js", "https://x/shared.js"]
        .into_iter()
        .map(|text| {
            let realm = Arc::clone(&realm);
            tokio::spawn(async move { realm.load_key(&key(text)).await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fetcher.fetch_count("https://x/shared.js"), 1);
    assert_eq!(fetcher.total_fetches(), 3);
    assert!(realm.is_loaded(&key("https://x/shared.js")));
}

#[tokio::test]
async fn test_failure_inside_cycle_is_never_partially_loaded() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/app.js",
        r##"
        module a { import "#b"; import "./missing.js"; }
        module b { import "#a"; }
        import "#a";
        "##,
    );
    let realm = realm(&fetcher);
    let a = key("https://x/app.js#a");
    let b = key("https://x/app.js#b");

    let err = realm.load_key(&key("https://x/app.js")).await.unwrap_err();
    assert_eq!(err.key, key("https://x/missing.js"));
    assert_eq!(err.stage, LoadStage::Fetch);

    for module in [&a, &b] {
        assert_eq!(realm.status(module), Some(ModuleStatus::Failed));
        assert!(!realm.is_loaded(module));
        assert_eq!(realm.load_key(module).await.unwrap_err(), err);
    }
    assert!(realm.instantiate(&b).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_loads_of_overlapping_cycles() {
    let fetcher = Arc::new(MemoryFetcher::new().with_delay(Duration::from_millis(5)));
    fetcher.insert("https://x/ring1.js", "import './ring2.js';");
    fetcher.insert("https://x/ring2.js", "import './ring3.js';");
    fetcher.insert("https://x/ring3.js", "import './ring1.js';");
    for i in 0..6 {
        fetcher.insert(
            &format!("https://x/entry{}.js", i),
            format!("import './ring{}.js';", i % 3 + 1),
        );
    }
    let realm = Arc::new(realm(&fetcher));

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let realm = Arc::clone(&realm);
            tokio::spawn(async move {
                let entry = key(&format!("https://x/entry{}.js", i));
                realm.load_key(&entry).await.map(|_| ())?;
                assert!(realm.is_loaded(&entry));
                Ok::<_, spacey_loader::LoadError>(())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    for i in 1..=3 {
        let ring = key(&format!("https://x/ring{}.js", i));
        assert_eq!(realm.status(&ring), Some(ModuleStatus::Loaded));
        assert_eq!(fetcher.fetch_count(ring.url().as_str()), 1);
    }
    assert!(realm.instantiate(&key("https://x/entry0.js")).is_ok());
}

#[tokio::test]
async fn test_load_failures_are_cached() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("https://x/main.js", "import './broken.js';");
    fetcher.insert("https://x/broken.js", "import { from './nowhere.js';");
    let realm = realm(&fetcher);

    let first = realm.load_key(&key("https://x/main.js")).await.unwrap_err();
    assert_eq!(first.key, key("https://x/broken.js"));
    assert_eq!(first.stage, LoadStage::Parse);

    let second = realm.load_key(&key("https://x/main.js")).await.unwrap_err();
    assert_eq!(first, second);
    assert_eq!(fetcher.fetch_count("https://x/broken.js"), 1);
    assert_eq!(realm.status(&key("https://x/main.js")), Some(ModuleStatus::Failed));
}

#[tokio::test]
async fn test_missing_fragment_fails_the_dependency() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("https://x/main.js", "import { x } from './lib.js#nope';");
    fetcher.insert("https://x/lib.js", "export const x = 1;");
    let realm = realm(&fetcher);

    let err = realm.load_key(&key("https://x/main.js")).await.unwrap_err();
    assert_eq!(err.key, key("https://x/lib.js#nope"));
    assert_eq!(realm.status(&key("https://x/lib.js#nope")), Some(ModuleStatus::Failed));
    // the resource itself is fine
    assert!(realm.load_key(&key("https://x/lib.js")).await.is_ok());
}

#[tokio::test]
async fn test_unbound_fragment_identifier() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://x/main.js",
        "module outer { module inner {} } import { x } from inner;",
    );
    let realm = realm(&fetcher);

    let err = realm.load_key(&key("https://x/main.js")).await.unwrap_err();
    assert_eq!(err.key, key("https://x/main.js"));
    assert!(matches!(
        err.kind,
        LoadErrorKind::Resolve(ResolveError::UnboundFragmentReference { ref specifier, .. }) if specifier == "inner"
    ));
}

#[tokio::test]
async fn test_import_map_is_applied() {
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert("https://x/main.js", "import { helper } from 'utils';");
    fetcher.insert("https://cdn/utils.js", "export function helper() {}");
    let import_map = ImportMap::from_json(
        r#"{ "imports": { "utils": "https://cdn/utils.js" } }"#,
        &Url::parse("https://x/").unwrap(),
    )
    .unwrap();
    let realm = Realm::builder()
        .fetcher(fetcher.clone())
        .import_map(Arc::new(import_map))
        .base_url(Url::parse("https://x/").unwrap())
        .build()
        .unwrap();

    let main = realm.load("./main.js").await.unwrap();
    assert_eq!(main.dependencies(), vec![key("https://cdn/utils.js")]);
    assert!(realm.is_loaded(&key("https://cdn/utils.js")));
}

#[tokio::test]
async fn test_bare_specifier_without_import_map() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let realm = realm(&fetcher);
    assert!(matches!(
        realm.load("lodash").await,
        Err(spacey_loader::Error::Resolve(ResolveError::InvalidSpecifier { .. }))
    ));
    assert_eq!(fetcher.total_fetches(), 0);
}
