//! End-to-end resolution over realistic `npm audit` and `npm ls` documents.

use audit_harvester::harvest::{HarvestPipeline, MergePolicy};
use serde_json::{json, Value};
use std::collections::HashSet;

fn audit_v7() -> Value {
    json!({
        "auditReportVersion": 2,
        "vulnerabilities": {
            "minimist": {
                "name": "minimist",
                "severity": "critical",
                "isDirect": false,
                "via": [{
                    "source": 1097678,
                    "name": "minimist",
                    "title": "Prototype Pollution in minimist",
                    "url": "https://github.com/advisories/GHSA-xvch-5gv4-984h",
                    "severity": "critical"
                }],
                "range": "<0.2.4"
            },
            "mkdirp": {
                "name": "mkdirp",
                "severity": "critical",
                "via": ["minimist"]
            },
            "lodash": {
                "name": "lodash",
                "severity": "high",
                "via": [{ "url": "https://github.com/advisories/GHSA-p6mc-m468-83gw" }]
            },
            "left-pad": { "severity": "low", "via": [] }
        },
        "metadata": { "vulnerabilities": { "critical": 2, "high": 1, "low": 1 } }
    })
}

fn npm_ls_tree() -> Value {
    json!({
        "name": "my-app",
        "version": "1.0.0",
        "dependencies": {
            "webpack": {
                "version": "4.46.0",
                "dependencies": {
                    "mkdirp": {
                        "version": "0.5.1",
                        "dependencies": {
                            "minimist": { "version": "0.0.8" }
                        }
                    },
                    "lodash": { "version": "4.17.15" }
                }
            },
            "eslint": {
                "version": "5.16.0",
                "dependencies": {
                    "mkdirp": {
                        "version": "0.5.1",
                        "dependencies": {
                            "minimist": { "version": "0.0.8" }
                        }
                    },
                    "lodash": { "version": "4.17.11" }
                }
            },
            "lodash": { "version": "4.17.15" },
            "express": { "version": "4.18.2" }
        }
    })
}

#[test]
fn test_rows_are_deduplicated_by_version() {
    let (resolution, stats) = HarvestPipeline::new().resolve(&audit_v7(), &npm_ls_tree());

    let rows: Vec<(String, String)> = resolution
        .rows
        .iter()
        .map(|r| (r.dedup_key(), r.display_chain()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("mkdirp@0.5.1".to_string(), "webpack -> mkdirp".to_string()),
            (
                "minimist@0.0.8".to_string(),
                "webpack -> mkdirp -> minimist".to_string()
            ),
            ("lodash@4.17.15".to_string(), "webpack -> lodash".to_string()),
            ("lodash@4.17.11".to_string(), "eslint -> lodash".to_string()),
        ]
    );
    assert_eq!(stats.discoveries, 7);

    let keys: HashSet<_> = resolution.rows.iter().map(|r| r.dedup_key()).collect();
    assert_eq!(keys.len(), resolution.rows.len());
}

#[test]
fn test_rows_carry_report_details() {
    let (resolution, _) = HarvestPipeline::new().resolve(&audit_v7(), &npm_ls_tree());

    let minimist = resolution.rows.iter().find(|r| r.package == "minimist").unwrap();
    assert_eq!(minimist.severity, "critical");
    assert_eq!(
        minimist.advisory_url,
        "https://github.com/advisories/GHSA-xvch-5gv4-984h"
    );

    let mkdirp = resolution.rows.iter().find(|r| r.package == "mkdirp").unwrap();
    assert_eq!(mkdirp.advisory_url, "");
}

#[test]
fn test_upgrade_groups_cover_every_row() {
    let (resolution, _) = HarvestPipeline::new().resolve(&audit_v7(), &npm_ls_tree());

    let parents: Vec<_> = resolution.upgrades.iter().map(|g| g.parent.as_str()).collect();
    assert_eq!(parents, vec!["webpack", "eslint"]);
    assert_eq!(
        resolution.upgrades[0].packages,
        vec!["mkdirp", "minimist", "lodash"]
    );
    assert_eq!(resolution.upgrades[1].packages, vec!["lodash"]);

    for row in &resolution.rows {
        let parent = row.top_level_parent().unwrap();
        let group = resolution
            .upgrades
            .iter()
            .find(|g| g.parent == parent)
            .unwrap();
        assert!(group.packages.contains(&row.package));
    }
}

#[test]
fn test_every_present_vulnerable_package_is_discovered() {
    let (resolution, _) = HarvestPipeline::new().resolve(&audit_v7(), &npm_ls_tree());

    let found: HashSet<_> = resolution.rows.iter().map(|r| r.package.as_str()).collect();
    assert!(found.contains("minimist"));
    assert!(found.contains("mkdirp"));
    assert!(found.contains("lodash"));
    // Listed in the report but not installed
    assert!(!found.contains("left-pad"));
}

#[test]
fn test_same_version_under_two_parents_keeps_first_chain() {
    let report = json!({
        "vulnerabilities": {
            "lodash": { "severity": "high", "via": [{ "url": "https://x/1" }] }
        }
    });
    let tree = json!({
        "dependencies": {
            "a": { "dependencies": { "lodash": { "version": "4.17.0" } } },
            "b": { "dependencies": { "lodash": { "version": "4.17.0" } } }
        }
    });

    let (resolution, stats) = HarvestPipeline::new().resolve(&report, &tree);
    assert_eq!(stats.discoveries, 2);
    assert_eq!(resolution.rows.len(), 1);
    assert_eq!(resolution.rows[0].display_chain(), "a -> lodash");
    assert_eq!(resolution.upgrades.len(), 1);
    assert_eq!(resolution.upgrades[0].parent, "a");
}

#[test]
fn test_empty_tree_yields_nothing() {
    let (resolution, stats) =
        HarvestPipeline::new().resolve(&audit_v7(), &json!({ "dependencies": {} }));
    assert_eq!(stats.vulnerable_packages, 4);
    assert!(resolution.rows.is_empty());
    assert!(resolution.upgrades.is_empty());
}

#[test]
fn test_v6_report_against_tree() {
    let report = json!({
        "advisories": {
            "1065": {
                "module_name": "lodash",
                "severity": "high",
                "url": "https://npmjs.com/advisories/1065",
                "findings": [{ "version": "4.17.11", "paths": ["eslint>lodash"] }]
            }
        }
    });

    let (resolution, _) = HarvestPipeline::new().resolve(&report, &npm_ls_tree());
    let keys: Vec<_> = resolution.rows.iter().map(|r| r.dedup_key()).collect();
    assert_eq!(keys, vec!["lodash@4.17.15", "lodash@4.17.11"]);
    assert!(resolution
        .rows
        .iter()
        .all(|r| r.advisory_url == "https://npmjs.com/advisories/1065"));
}

#[test]
fn test_mixed_report_respects_merge_policy() {
    let report = json!({
        "advisories": {
            "1": { "module_name": "lodash", "severity": "moderate", "url": "https://x/v6" }
        },
        "vulnerabilities": {
            "lodash": { "severity": "critical", "via": [] },
            "minimist": { "severity": "low", "via": [] }
        }
    });

    let (first, _) = HarvestPipeline::new().resolve(&report, &npm_ls_tree());
    assert_eq!(first.index.len(), 2);
    assert_eq!(first.index.detail("lodash").unwrap().severity, "moderate");

    let (highest, _) = HarvestPipeline::new()
        .with_merge_policy(MergePolicy::HighestSeverity)
        .resolve(&report, &npm_ls_tree());
    let lodash = highest.rows.iter().find(|r| r.package == "lodash").unwrap();
    assert_eq!(lodash.severity, "critical");
    assert_eq!(lodash.advisory_url, "https://x/v6");
}

#[test]
fn test_resolution_is_deterministic() {
    let pipeline = HarvestPipeline::new();
    let (a, _) = pipeline.resolve(&audit_v7(), &npm_ls_tree());
    let (b, _) = pipeline.resolve(&audit_v7(), &npm_ls_tree());
    assert_eq!(a.rows, b.rows);
    assert_eq!(a.upgrades, b.upgrades);
    assert_eq!(a.index, b.index);
}

#[test]
fn test_package_below_nested_copy_of_its_ancestor_is_found() {
    let report = json!({
        "vulnerabilities": {
            "lodash": { "severity": "high", "via": [{ "url": "https://x/lodash" }] }
        }
    });
    let tree = json!({
        "name": "app",
        "dependencies": {
            "readable-stream": {
                "version": "3.6.0",
                "dependencies": {
                    "through2": {
                        "version": "2.0.5",
                        "dependencies": {
                            "readable-stream": {
                                "version": "2.3.7",
                                "dependencies": { "lodash": { "version": "4.17.0" } }
                            }
                        }
                    }
                }
            }
        }
    });

    let (resolution, stats) = HarvestPipeline::new().resolve(&report, &tree);
    assert_eq!(stats.discoveries, 1);
    assert_eq!(resolution.rows[0].dedup_key(), "lodash@4.17.0");
    assert_eq!(resolution.upgrades[0].parent, "readable-stream");
    assert_eq!(resolution.upgrades[0].packages, vec!["lodash"]);
}
