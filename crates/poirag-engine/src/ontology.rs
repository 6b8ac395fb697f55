//! Category ontology: a small hand-curated hierarchy over the Chinese POI
//! taxonomy, plus the keyword and relevance tables derived from it.
//!
//! This is deliberately a lookup table, not a learned model. It covers the
//! categories that actually occur in the corpus; unknown categories pass
//! through untouched.

use poirag_core::models::Poi;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Child category to its parent in the taxonomy.
fn parents() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&str, &str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            ("粤菜馆", "中餐厅"),
            ("川菜馆", "中餐厅"),
            ("火锅店", "中餐厅"),
            ("中餐厅", "餐饮服务"),
            ("外国餐厅", "餐饮服务"),
            ("快餐店", "餐饮服务"),
            ("咖啡厅", "餐饮服务"),
            ("茶艺馆", "餐饮服务"),
            ("甜品店", "餐饮服务"),
            ("便利店", "购物服务"),
            ("超级市场", "购物服务"),
            ("商场", "购物服务"),
            ("专卖店", "购物服务"),
            ("地铁站", "交通设施服务"),
            ("公交车站", "交通设施服务"),
            ("停车场", "交通设施服务"),
            ("综合医院", "医疗保健服务"),
            ("专科医院", "医疗保健服务"),
            ("诊所", "医疗保健服务"),
            ("药店", "医疗保健服务"),
            ("高等院校", "科教文化服务"),
            ("中学", "科教文化服务"),
            ("小学", "科教文化服务"),
            ("幼儿园", "科教文化服务"),
            ("培训机构", "科教文化服务"),
            ("图书馆", "科教文化服务"),
            ("银行", "金融保险服务"),
            ("自动提款机", "金融保险服务"),
            ("保险公司", "金融保险服务"),
            ("宾馆酒店", "住宿服务"),
            ("旅馆招待所", "住宿服务"),
            ("公园广场", "风景名胜"),
            ("风景名胜", "旅游景点"),
            ("写字楼", "商务住宅"),
            ("住宅区", "商务住宅"),
        ])
    })
}

/// Colloquial query words to the taxonomy categories they imply.
fn keyword_categories() -> &'static [(&'static str, &'static [&'static str])] {
    &[
        ("咖啡", &["咖啡厅"]),
        ("奶茶", &["甜品店", "茶艺馆"]),
        ("吃饭", &["餐饮服务"]),
        ("美食", &["餐饮服务"]),
        ("餐厅", &["餐饮服务"]),
        ("早餐", &["快餐店", "中餐厅"]),
        ("购物", &["购物服务"]),
        ("超市", &["超级市场", "便利店"]),
        ("商场", &["商场"]),
        ("地铁", &["地铁站"]),
        ("公交", &["公交车站"]),
        ("停车", &["停车场"]),
        ("医院", &["综合医院", "专科医院"]),
        ("看病", &["综合医院", "诊所"]),
        ("买药", &["药店"]),
        ("学校", &["科教文化服务"]),
        ("大学", &["高等院校"]),
        ("图书馆", &["图书馆"]),
        ("银行", &["银行"]),
        ("取钱", &["银行", "自动提款机"]),
        ("酒店", &["宾馆酒店"]),
        ("住宿", &["住宿服务"]),
        ("公园", &["公园广场"]),
    ]
}

/// Replace each category with its most general known ancestor (small class
/// through mid class up to the top-level service class). Unknown categories
/// pass through; the result is deduplicated.
pub fn generalize_categories(categories: &[String]) -> Vec<String> {
    let table = parents();
    let mut out: Vec<String> = Vec::with_capacity(categories.len());
    for category in categories {
        let mut broad = category.as_str();
        while let Some(parent) = table.get(broad) {
            broad = parent;
        }
        let broad = broad.to_string();
        if !out.contains(&broad) {
            out.push(broad);
        }
    }
    out
}

/// True when generalization would actually broaden the category set.
pub fn can_generalize(categories: &[String]) -> bool {
    let table = parents();
    categories.iter().any(|c| table.contains_key(c.as_str()))
}

/// Infer categories from the raw question text.
pub fn detect_categories(question: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (keyword, categories) in keyword_categories() {
        if question.contains(keyword) {
            for category in *categories {
                let category = category.to_string();
                if !out.contains(&category) {
                    out.push(category);
                }
            }
        }
    }
    out
}

/// Typed landmark relevance. Subway stations anchor spatial descriptions far
/// better than banks, so the scale is by how recognizable the type is.
const LANDMARK_RELEVANCE: &[(&str, u8)] = &[
    ("地铁站", 10),
    ("大学", 9),
    ("高等院校", 9),
    ("学校", 8),
    ("中学", 8),
    ("医院", 7),
    ("商场", 6),
    ("购物中心", 6),
    ("广场", 5),
    ("公园", 4),
    ("银行", 3),
];

/// Relevance score of a POI as a landmark, 0 when it is no landmark type.
pub fn landmark_relevance(poi: &Poi) -> u8 {
    LANDMARK_RELEVANCE
        .iter()
        .filter(|(keyword, _)| {
            poi.name.contains(keyword)
                || poi.category_mid.contains(keyword)
                || poi.category_small.contains(keyword)
        })
        .map(|(_, score)| *score)
        .max()
        .unwrap_or(0)
}
