//! Canonicalizes free-text folder and category names to a standard vocabulary.

use std::collections::BTreeMap;

/// Variant → standard name. Order matters for substring matching.
static NORMALIZATION_MAP: &[(&str, &str)] = &[
    ("开发", "开发工具"),
    ("Dev", "开发工具"),
    ("Development", "开发工具"),
    ("编程", "开发工具"),
    ("Programming", "开发工具"),
    ("代码", "开发工具"),
    ("Code", "开发工具"),
    ("GitHub", "开发工具"),
    ("技术", "开发工具"),
    ("Tech", "开发工具"),
    ("AI", "AI工具"),
    ("ai", "AI工具"),
    ("人工智能", "AI工具"),
    ("ChatGPT", "AI工具"),
    ("LLM", "AI工具"),
    ("机器学习", "AI工具"),
    ("ML", "AI工具"),
    ("学习", "学习教育"),
    ("Study", "学习教育"),
    ("教育", "学习教育"),
    ("Education", "学习教育"),
    ("课程", "学习教育"),
    ("Course", "学习教育"),
    ("教程", "学习教育"),
    ("Tutorial", "学习教育"),
    ("工作", "工作效率"),
    ("Work", "工作效率"),
    ("办公", "工作效率"),
    ("Office", "工作效率"),
    ("效率", "工作效率"),
    ("Productivity", "工作效率"),
    ("笔记", "效率工具"),
    ("Notes", "效率工具"),
    ("设计", "设计工具"),
    ("Design", "设计工具"),
    ("UI", "设计工具"),
    ("UX", "设计工具"),
    ("美工", "设计工具"),
    ("视频", "视频娱乐"),
    ("Video", "视频娱乐"),
    ("影视", "视频娱乐"),
    ("电影", "视频娱乐"),
    ("Movie", "视频娱乐"),
    ("YouTube", "视频娱乐"),
    ("B站", "视频娱乐"),
    ("Bilibili", "视频娱乐"),
    ("社交", "社交媒体"),
    ("Social", "社交媒体"),
    ("SNS", "社交媒体"),
    ("社区", "社交媒体"),
    ("Community", "社交媒体"),
    ("Twitter", "社交媒体"),
    ("新闻", "新闻资讯"),
    ("News", "新闻资讯"),
    ("资讯", "新闻资讯"),
    ("媒体", "新闻资讯"),
    ("Media", "新闻资讯"),
    ("购物", "购物"),
    ("Shopping", "购物"),
    ("电商", "购物"),
    ("Ecommerce", "购物"),
    ("买东西", "购物"),
    ("游戏", "游戏平台"),
    ("Game", "游戏平台"),
    ("Gaming", "游戏平台"),
    ("Steam", "游戏平台"),
    ("工具", "在线工具"),
    ("Tools", "在线工具"),
    ("网站", "常用网站"),
    ("Websites", "常用网站"),
    ("收藏", "我的收藏"),
    ("Favorites", "我的收藏"),
    ("临时", "待整理"),
    ("Temp", "待整理"),
    ("未分类", "待整理"),
    ("Uncategorized", "待整理"),
];

/// Recommended top-level folders.
pub const STANDARD_FOLDERS: &[&str] = &[
    "开发工具",
    "AI工具",
    "学习教育",
    "工作效率",
    "效率工具",
    "设计工具",
    "视频娱乐",
    "社交媒体",
    "新闻资讯",
    "购物",
    "游戏平台",
    "技术文档",
    "在线工具",
    "搜索引擎",
    "金融理财",
    "健康医疗",
    "旅游出行",
    "生活服务",
    "常用网站",
    "我的收藏",
    "待整理",
];

pub fn is_standard(name: &str) -> bool {
    STANDARD_FOLDERS.contains(&name)
}

/// Maps `name` to its standard folder, or returns it trimmed and unchanged.
///
/// Standard names map to themselves, so the function is idempotent.
pub fn normalize(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() || is_standard(name) {
        return name.to_string();
    }

    if let Some((_, standard)) = NORMALIZATION_MAP.iter().find(|(variant, _)| *variant == name) {
        return standard.to_string();
    }

    let lower = name.to_lowercase();
    if let Some((_, standard)) = NORMALIZATION_MAP
        .iter()
        .find(|(variant, _)| variant.to_lowercase() == lower)
    {
        return standard.to_string();
    }

    if let Some((_, standard)) = NORMALIZATION_MAP
        .iter()
        .find(|(variant, _)| name.contains(variant) || variant.contains(name))
    {
        return standard.to_string();
    }

    name.to_string()
}

pub fn needs_normalization(name: &str) -> bool {
    normalize(name) != name
}

/// The standard name followed by every variant that maps onto it.
pub fn folder_variants(standard: &str) -> Vec<String> {
    let mut variants = vec![standard.to_string()];
    for (variant, target) in NORMALIZATION_MAP {
        if *target == standard && !variants.iter().any(|v| v == variant) {
            variants.push(variant.to_string());
        }
    }
    variants
}

/// Closest standard folder for `name`, if any.
pub fn find_similar_standard_folder(name: &str) -> Option<&'static str> {
    let normalized = normalize(name);
    if let Some(standard) = STANDARD_FOLDERS.iter().find(|s| **s == normalized) {
        return Some(standard);
    }

    let lower = name.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    STANDARD_FOLDERS.iter().copied().find(|standard| {
        let s = standard.to_lowercase();
        s.contains(&lower) || lower.contains(&s)
    })
}

/// Existing folder name → standard name, for folders that would be renamed.
pub fn merge_suggestions<S: AsRef<str>>(existing: &[S]) -> BTreeMap<String, String> {
    existing
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| needs_normalization(name))
        .map(|name| (name.to_string(), normalize(name)))
        .collect()
}
