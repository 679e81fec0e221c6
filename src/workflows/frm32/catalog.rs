use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::{MetricCode, ScoreValue};

/// Default tolerance when checking that catalog weights sum to 100.
pub const DEFAULT_WEIGHT_EPSILON: f64 = 0.01;

/// Canned comment pair for one score value of one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CannedComment {
    pub en: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tr: Option<String>,
}

impl CannedComment {
    fn en(text: &str) -> Self {
        Self {
            en: text.to_string(),
            tr: None,
        }
    }
}

/// The four canned explanations of what evidence justifies each score value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreComments {
    pub at_zero: CannedComment,
    pub at_three: CannedComment,
    pub at_six: CannedComment,
    pub at_ten: CannedComment,
}

impl ScoreComments {
    pub fn for_score(&self, score: ScoreValue) -> &CannedComment {
        match score {
            ScoreValue::Zero => &self.at_zero,
            ScoreValue::Three => &self.at_three,
            ScoreValue::Six => &self.at_six,
            ScoreValue::Ten => &self.at_ten,
        }
    }
}

/// One weighted scoring dimension of the FRM32 capability assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct K2Metric {
    pub code: MetricCode,
    pub scope_en: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_tr: Option<String>,
    pub weight_percentage: f64,
    pub comments: ScoreComments,
}

/// Catalog failures, including the referential-integrity case where a score
/// references a criterion the catalog does not know.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate metric code {}", .0.as_str())]
    DuplicateCode(MetricCode),
    #[error("metric {} has non-positive weight {weight}", code.as_str())]
    InvalidWeight { code: MetricCode, weight: f64 },
    #[error("catalog weights sum to {sum}, expected 100 ± {epsilon}")]
    WeightSumMismatch { sum: f64, epsilon: f64 },
    #[error("unknown metric code {}", .0.as_str())]
    UnknownMetric(MetricCode),
}

/// Immutable reference data: the ordered set of weighted K2 criteria.
///
/// Seeded once at startup (or by an out-of-band migration) and read-only
/// afterwards. Construction enforces the weight-sum invariant the scoring
/// algorithm silently depends on.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    metrics: BTreeMap<MetricCode, K2Metric>,
}

impl MetricCatalog {
    pub fn new(metrics: Vec<K2Metric>, weight_epsilon: f64) -> Result<Self, CatalogError> {
        let mut by_code = BTreeMap::new();
        let mut sum = 0.0;

        for metric in metrics {
            if metric.weight_percentage <= 0.0 {
                return Err(CatalogError::InvalidWeight {
                    code: metric.code,
                    weight: metric.weight_percentage,
                });
            }
            sum += metric.weight_percentage;
            let code = metric.code.clone();
            if by_code.insert(code.clone(), metric).is_some() {
                return Err(CatalogError::DuplicateCode(code));
            }
        }

        if (sum - 100.0).abs() > weight_epsilon {
            return Err(CatalogError::WeightSumMismatch {
                sum,
                epsilon: weight_epsilon,
            });
        }

        Ok(Self { metrics: by_code })
    }

    pub fn lookup(&self, code: &MetricCode) -> Result<&K2Metric, CatalogError> {
        self.metrics
            .get(code)
            .ok_or_else(|| CatalogError::UnknownMetric(code.clone()))
    }

    /// Ordered listing, optionally restricted to the requested codes.
    ///
    /// A requested code missing from the catalog surfaces as
    /// [`CatalogError::UnknownMetric`] rather than being silently skipped.
    pub fn list_metrics(
        &self,
        codes: Option<&BTreeSet<MetricCode>>,
    ) -> Result<Vec<&K2Metric>, CatalogError> {
        match codes {
            None => Ok(self.metrics.values().collect()),
            Some(codes) => codes
                .iter()
                .map(|code| self.lookup(code))
                .collect::<Result<Vec<_>, _>>(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &K2Metric> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// The production FRM32 catalog: ten K2 criteria weighted to sum to 100.
    pub fn standard() -> Self {
        let metrics = vec![
            metric(
                "K2.1",
                "HSE policy, leadership and management commitment",
                Some("İSG politikası, liderlik ve yönetim taahhüdü"),
                15.0,
                "No documented HSE policy or only attachment references.",
                "Policy exists but is generic, unsigned or not communicated.",
                "Signed policy communicated to staff, reviews irregular.",
                "Signed, current policy with leadership reviews, objectives and communicated expectations.",
            ),
            metric(
                "K2.2",
                "Hazard identification and risk assessment process",
                Some("Tehlike tanımlama ve risk değerlendirme süreci"),
                12.0,
                "No risk assessments provided.",
                "Ad-hoc assessments without methodology or review dates.",
                "Structured assessments for main activities, partial coverage.",
                "Comprehensive, current assessments with methodology, review cycle and action tracking.",
            ),
            metric(
                "K2.3",
                "HSE training and workforce competence",
                Some("İSG eğitimi ve çalışan yetkinliği"),
                12.0,
                "No training records.",
                "Induction only, no refresher planning or records of attendance.",
                "Training matrix exists, gaps in refresher execution.",
                "Role-based training matrix, delivered and refreshed on schedule with competence checks.",
            ),
            metric(
                "K2.4",
                "Emergency preparedness and response",
                Some("Acil durum hazırlığı ve müdahale"),
                10.0,
                "No emergency plans.",
                "Plan exists on paper, no drills or assigned responsibilities.",
                "Plans and responsibilities defined, drills infrequent.",
                "Tested plans with scheduled drills, drill evaluations and corrective follow-up.",
            ),
            metric(
                "K2.5",
                "Incident reporting and investigation",
                Some("Olay bildirimi ve araştırması"),
                10.0,
                "No reporting mechanism or records.",
                "Incidents recorded but not investigated.",
                "Investigations performed, root causes inconsistently identified.",
                "All incidents investigated to root cause with tracked corrective actions and trend review.",
            ),
            metric(
                "K2.6",
                "Equipment and PPE management",
                Some("Ekipman ve KKD yönetimi"),
                10.0,
                "No PPE provision or inspection evidence.",
                "PPE issued without suitability review or inspection records.",
                "PPE and equipment inspected, records partially maintained.",
                "Suitability-assessed PPE, inspection and maintenance program with complete records.",
            ),
            metric(
                "K2.7",
                "Subcontractor and supply-chain HSE control",
                Some("Alt yüklenici ve tedarik zinciri İSG kontrolü"),
                8.0,
                "No subcontractor controls.",
                "Contractual clauses only, no verification.",
                "Pre-qualification in place, site verification sporadic.",
                "Pre-qualification, onboarding and ongoing performance verification of subcontractors.",
            ),
            metric(
                "K2.8",
                "Environmental and waste management",
                Some("Çevre ve atık yönetimi"),
                8.0,
                "No environmental controls evidenced.",
                "Waste segregated ad hoc, no legal register.",
                "Legal register and waste procedures exist, monitoring partial.",
                "Managed aspects/impacts register, compliant disposal and monitored environmental KPIs.",
            ),
            metric(
                "K2.9",
                "Occupational health surveillance",
                Some("İş sağlığı gözetimi"),
                8.0,
                "No health surveillance.",
                "Pre-employment checks only.",
                "Periodic examinations performed, exposure-based planning missing.",
                "Exposure-based surveillance program with periodic examinations and fitness tracking.",
            ),
            metric(
                "K2.10",
                "HSE performance monitoring and continual improvement",
                Some("İSG performans izleme ve sürekli iyileştirme"),
                7.0,
                "No performance indicators.",
                "Lagging indicators collected, not reviewed.",
                "Leading and lagging indicators reviewed, actions informal.",
                "KPI suite with management review, quantified targets and documented improvement actions.",
            ),
        ];

        Self::new(metrics, DEFAULT_WEIGHT_EPSILON).expect("standard catalog satisfies invariants")
    }
}

fn metric(
    code: &str,
    scope_en: &str,
    scope_tr: Option<&str>,
    weight_percentage: f64,
    at_zero: &str,
    at_three: &str,
    at_six: &str,
    at_ten: &str,
) -> K2Metric {
    K2Metric {
        code: MetricCode(code.to_string()),
        scope_en: scope_en.to_string(),
        scope_tr: scope_tr.map(str::to_string),
        weight_percentage,
        comments: ScoreComments {
            at_zero: CannedComment::en(at_zero),
            at_three: CannedComment::en(at_three),
            at_six: CannedComment::en(at_six),
            at_ten: CannedComment::en(at_ten),
        },
    }
}
