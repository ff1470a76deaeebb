//! Scoring models understood by the external search engine
//!
//! Each model only knows how to turn its parameters into engine arguments.
//! List-valued parameters are passed through whole; the engine writes one
//! run file per combination.

use super::params::MAX_RANGE_VALUES;
use super::ParamList;
use serde::{Deserialize, Serialize};

fn default_k1() -> ParamList {
    ParamList::single(0.9)
}

fn default_b() -> ParamList {
    ParamList::single(0.4)
}

fn default_one() -> f64 {
    1.0
}

fn default_prf_k1() -> ParamList {
    ParamList::from_known(vec![0.65, 0.70, 0.75])
}

fn default_prf_b() -> ParamList {
    ParamList::from_known(vec![0.60, 0.7])
}

fn default_fb_terms() -> ParamList {
    ParamList::from_known(vec![65.0, 70.0, 95.0, 100.0])
}

fn default_fb_docs() -> ParamList {
    ParamList::from_known(vec![5.0, 10.0, 15.0])
}

fn default_original_query_weight() -> ParamList {
    ParamList::single(0.5)
}

fn default_new_term_weight() -> ParamList {
    ParamList::from_known(vec![0.2, 0.25])
}

fn default_axiom_r() -> ParamList {
    ParamList::single(20.0)
}

fn default_axiom_n() -> ParamList {
    ParamList::single(30.0)
}

fn default_axiom_top() -> ParamList {
    ParamList::single(20.0)
}

fn default_mu() -> ParamList {
    ParamList::single(1000.0)
}

fn default_lam() -> ParamList {
    ParamList::single(0.1)
}

fn default_c() -> f64 {
    0.1
}

fn default_s() -> f64 {
    0.5
}

fn default_tw() -> f64 {
    0.85
}

fn default_ow() -> f64 {
    0.15
}

fn default_uw() -> f64 {
    0.05
}

/// First-stage scoring model and its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ScoringModel {
    Bm25 {
        #[serde(default = "default_k1")]
        k1: ParamList,
        #[serde(default = "default_b")]
        b: ParamList,
    },
    /// Grid over k1 and b from 0.1 up to the maxima in 0.1 steps
    Bm25Grid {
        #[serde(default = "default_one")]
        k1max: f64,
        #[serde(default = "default_one")]
        bmax: f64,
    },
    Bm25Rm3 {
        #[serde(default = "default_prf_k1")]
        k1: ParamList,
        #[serde(default = "default_prf_b")]
        b: ParamList,
        #[serde(default = "default_fb_terms")]
        fb_terms: ParamList,
        #[serde(default = "default_fb_docs")]
        fb_docs: ParamList,
        #[serde(default = "default_original_query_weight")]
        original_query_weight: ParamList,
    },
    Bm25Prf {
        #[serde(default = "default_prf_k1")]
        k1: ParamList,
        #[serde(default = "default_prf_b")]
        b: ParamList,
        #[serde(default = "default_fb_terms")]
        fb_terms: ParamList,
        #[serde(default = "default_fb_docs")]
        fb_docs: ParamList,
        #[serde(default = "default_new_term_weight")]
        new_term_weight: ParamList,
    },
    Axiomatic {
        #[serde(default = "default_k1")]
        k1: ParamList,
        #[serde(default = "default_b")]
        b: ParamList,
        #[serde(default = "default_axiom_r")]
        r: ParamList,
        #[serde(default = "default_axiom_n")]
        n: ParamList,
        #[serde(default = "default_b")]
        beta: ParamList,
        #[serde(default = "default_axiom_top")]
        top: ParamList,
    },
    DirichletQl {
        #[serde(default = "default_mu")]
        mu: ParamList,
    },
    Qljm {
        #[serde(default = "default_lam")]
        lam: ParamList,
    },
    Inl2 {
        #[serde(default = "default_c")]
        c: f64,
    },
    Spl {
        #[serde(default = "default_c")]
        c: f64,
    },
    #[serde(rename = "f2exp")]
    F2Exp {
        #[serde(default = "default_s")]
        s: f64,
    },
    #[serde(rename = "f2log")]
    F2Log {
        #[serde(default = "default_s")]
        s: f64,
    },
    /// Sequential dependence model; only k1 and b may be lists
    Sdm {
        #[serde(default = "default_k1")]
        k1: ParamList,
        #[serde(default = "default_b")]
        b: ParamList,
        #[serde(default = "default_tw")]
        tw: f64,
        #[serde(default = "default_ow")]
        ow: f64,
        #[serde(default = "default_uw")]
        uw: f64,
    },
}

impl Default for ScoringModel {
    fn default() -> Self {
        Self::Bm25 {
            k1: default_k1(),
            b: default_b(),
        }
    }
}

fn push_list(args: &mut Vec<String>, flag: &str, values: &ParamList) {
    args.push(flag.to_string());
    args.extend(values.to_args());
}

fn push_value(args: &mut Vec<String>, flag: &str, value: f64) {
    args.push(flag.to_string());
    args.push(value.to_string());
}

fn push_bm25(args: &mut Vec<String>, k1: &ParamList, b: &ParamList) {
    args.push("-bm25".to_string());
    push_list(args, "-bm25.k1", k1);
    push_list(args, "-bm25.b", b);
}

/// `0.1, 0.2, .. max`, rounded to one decimal
fn tenth_steps(max: f64) -> ParamList {
    let steps = (max * 10.0).round().max(1.0).min(MAX_RANGE_VALUES as f64) as u32;
    ParamList::from_known((1..=steps).map(|i| f64::from(i) / 10.0).collect())
}

impl ScoringModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bm25 { .. } => "bm25",
            Self::Bm25Grid { .. } => "bm25_grid",
            Self::Bm25Rm3 { .. } => "bm25_rm3",
            Self::Bm25Prf { .. } => "bm25_prf",
            Self::Axiomatic { .. } => "axiomatic",
            Self::DirichletQl { .. } => "dirichlet_ql",
            Self::Qljm { .. } => "qljm",
            Self::Inl2 { .. } => "inl2",
            Self::Spl { .. } => "spl",
            Self::F2Exp { .. } => "f2exp",
            Self::F2Log { .. } => "f2log",
            Self::Sdm { .. } => "sdm",
        }
    }

    /// Every list-valued parameter, for validation and grid sizing
    pub fn param_lists(&self) -> Vec<(&'static str, ParamList)> {
        match self {
            Self::Bm25 { k1, b } => vec![("k1", k1.clone()), ("b", b.clone())],
            Self::Bm25Grid { k1max, bmax } => {
                vec![("k1", tenth_steps(*k1max)), ("b", tenth_steps(*bmax))]
            }
            Self::Bm25Rm3 {
                k1,
                b,
                fb_terms,
                fb_docs,
                original_query_weight,
            } => vec![
                ("k1", k1.clone()),
                ("b", b.clone()),
                ("fb_terms", fb_terms.clone()),
                ("fb_docs", fb_docs.clone()),
                ("original_query_weight", original_query_weight.clone()),
            ],
            Self::Bm25Prf {
                k1,
                b,
                fb_terms,
                fb_docs,
                new_term_weight,
            } => vec![
                ("k1", k1.clone()),
                ("b", b.clone()),
                ("fb_terms", fb_terms.clone()),
                ("fb_docs", fb_docs.clone()),
                ("new_term_weight", new_term_weight.clone()),
            ],
            Self::Axiomatic {
                k1,
                b,
                r,
                n,
                beta,
                top,
            } => vec![
                ("k1", k1.clone()),
                ("b", b.clone()),
                ("r", r.clone()),
                ("n", n.clone()),
                ("beta", beta.clone()),
                ("top", top.clone()),
            ],
            Self::DirichletQl { mu } => vec![("mu", mu.clone())],
            Self::Qljm { lam } => vec![("lam", lam.clone())],
            Self::Inl2 { c } | Self::Spl { c } => vec![("c", ParamList::single(*c))],
            Self::F2Exp { s } | Self::F2Log { s } => vec![("s", ParamList::single(*s))],
            Self::Sdm { k1, b, .. } => vec![("k1", k1.clone()), ("b", b.clone())],
        }
    }

    /// `(k1, b)` lists for in-process BM25; `None` for other models
    pub fn bm25_grid(&self) -> Option<(ParamList, ParamList)> {
        match self {
            Self::Bm25 { k1, b } => Some((k1.clone(), b.clone())),
            Self::Bm25Grid { k1max, bmax } => Some((tenth_steps(*k1max), tenth_steps(*bmax))),
            _ => None,
        }
    }

    /// Number of run files one search produces
    pub fn grid_size(&self) -> usize {
        self.param_lists().iter().map(|(_, list)| list.len()).product()
    }

    /// Engine arguments for this model
    pub fn engine_args(&self, hits: usize) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::Bm25 { k1, b } => push_bm25(&mut args, k1, b),
            Self::Bm25Grid { k1max, bmax } => {
                push_bm25(&mut args, &tenth_steps(*k1max), &tenth_steps(*bmax))
            }
            Self::Bm25Rm3 {
                k1,
                b,
                fb_terms,
                fb_docs,
                original_query_weight,
            } => {
                args.push("-rm3".to_string());
                push_list(&mut args, "-rm3.fbTerms", fb_terms);
                push_list(&mut args, "-rm3.fbDocs", fb_docs);
                push_list(&mut args, "-rm3.originalQueryWeight", original_query_weight);
                push_bm25(&mut args, k1, b);
            }
            Self::Bm25Prf {
                k1,
                b,
                fb_terms,
                fb_docs,
                new_term_weight,
            } => {
                args.push("-bm25prf".to_string());
                push_list(&mut args, "-bm25prf.fbTerms", fb_terms);
                push_list(&mut args, "-bm25prf.fbDocs", fb_docs);
                push_list(&mut args, "-bm25prf.newTermWeight", new_term_weight);
                push_list(&mut args, "-bm25prf.k1", k1);
                push_list(&mut args, "-bm25prf.b", b);
                push_bm25(&mut args, k1, b);
            }
            Self::Axiomatic {
                k1,
                b,
                r,
                n,
                beta,
                top,
            } => {
                args.push("-axiom".to_string());
                args.push("-axiom.deterministic".to_string());
                push_list(&mut args, "-axiom.r", r);
                push_list(&mut args, "-axiom.n", n);
                push_list(&mut args, "-axiom.beta", beta);
                push_list(&mut args, "-axiom.top", top);
                push_bm25(&mut args, k1, b);
            }
            Self::DirichletQl { mu } => {
                args.push("-qld".to_string());
                push_list(&mut args, "-qld.mu", mu);
            }
            Self::Qljm { lam } => {
                args.push("-qljm".to_string());
                push_list(&mut args, "-qljm.lambda", lam);
            }
            Self::Inl2 { c } => {
                args.push("-inl2".to_string());
                push_value(&mut args, "-inl2.c", *c);
            }
            Self::Spl { c } => {
                args.push("-spl".to_string());
                push_value(&mut args, "-spl.c", *c);
            }
            Self::F2Exp { s } => {
                args.push("-f2exp".to_string());
                push_value(&mut args, "-f2exp.s", *s);
            }
            Self::F2Log { s } => {
                args.push("-f2log".to_string());
                push_value(&mut args, "-f2log.s", *s);
            }
            Self::Sdm { k1, b, tw, ow, uw } => {
                args.push("-sdm".to_string());
                push_value(&mut args, "-sdm.tw", *tw);
                push_value(&mut args, "-sdm.ow", *ow);
                push_value(&mut args, "-sdm.uw", *uw);
                push_bm25(&mut args, k1, b);
            }
        }
        push_value(&mut args, "-hits", hits as f64);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bm25_args() {
        let model = ScoringModel::Bm25 {
            k1: ParamList::new(vec![0.9, 1.2]).unwrap(),
            b: ParamList::single(0.4),
        };
        assert_eq!(
            model.engine_args(1000).join(" "),
            "-bm25 -bm25.k1 0.9 1.2 -bm25.b 0.4 -hits 1000"
        );
        assert_eq!(model.grid_size(), 2);
    }

    #[test]
    fn test_rm3_grid_size() {
        let model: ScoringModel = toml::from_str("name = \"bm25_rm3\"").unwrap();
        // 3 k1 x 2 b x 4 fbTerms x 3 fbDocs x 1 weight
        assert_eq!(model.grid_size(), 72);
        let args = model.engine_args(10).join(" ");
        assert!(args.starts_with("-rm3 -rm3.fbTerms 65 70 95 100"));
        assert!(args.ends_with("-hits 10"));
    }

    #[test]
    fn test_grid_steps() {
        let model = ScoringModel::Bm25Grid {
            k1max: 0.3,
            bmax: 0.2,
        };
        assert_eq!(
            model.engine_args(5).join(" "),
            "-bm25 -bm25.k1 0.1 0.2 0.3 -bm25.b 0.1 0.2 -hits 5"
        );
    }

    #[test]
    fn test_default_lists_survive_validation() {
        let model: ScoringModel = toml::from_str("name = \"bm25_prf\"").unwrap();
        for (name, list) in model.param_lists() {
            assert!(ParamList::new(list.values().to_vec()).is_ok(), "{}", name);
        }

        let huge = ScoringModel::Bm25Grid {
            k1max: f64::NAN,
            bmax: 1e12,
        };
        let (k1, b) = huge.bm25_grid().unwrap();
        assert_eq!(k1.values(), &[0.1]);
        assert_eq!(b.len(), MAX_RANGE_VALUES);
    }

    #[test]
    fn test_scalar_models() {
        let model: ScoringModel = toml::from_str("name = \"inl2\"\nc = 0.2").unwrap();
        assert_eq!(model.engine_args(100).join(" "), "-inl2 -inl2.c 0.2 -hits 100");
        assert_eq!(model.grid_size(), 1);
    }
}
