//! Static hostname → category dictionary for well-known sites.

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};
use url::Url;

/// Confidence of an exact hostname hit.
pub const EXACT_CONFIDENCE: f64 = 0.95;
/// Confidence of a parent-domain hit (`docs.github.com` → `github.com`).
pub const SUFFIX_CONFIDENCE: f64 = 0.9;

/// `(domain, category, keywords)`
static DOMAIN_PATTERNS: &[(&str, &str, &[&str])] = &[
    // Developer tools
    ("github.com", "开发工具", &["代码", "仓库", "repository", "git"]),
    ("gitlab.com", "开发工具", &["代码", "git", "仓库"]),
    ("gitee.com", "开发工具", &["码云", "代码", "git"]),
    ("stackoverflow.com", "开发工具", &["问答", "编程", "开发"]),
    ("segmentfault.com", "开发工具", &["思否", "问答", "编程"]),
    ("npmjs.com", "开发工具", &["npm", "包管理", "javascript"]),
    ("pypi.org", "开发工具", &["python", "包", "pip"]),
    ("hub.docker.com", "开发工具", &["docker", "容器", "镜像"]),
    ("codepen.io", "开发工具", &["代码", "前端", "演示"]),
    ("jsfiddle.net", "开发工具", &["代码", "javascript", "演示"]),
    ("codesandbox.io", "开发工具", &["代码", "沙箱", "在线编辑"]),
    ("replit.com", "开发工具", &["代码", "在线编程", "IDE"]),
    // AI
    ("openai.com", "AI工具", &["chatgpt", "gpt", "ai"]),
    ("chat.openai.com", "AI工具", &["chatgpt", "聊天", "ai"]),
    ("claude.ai", "AI工具", &["claude", "anthropic", "ai"]),
    ("perplexity.ai", "AI工具", &["搜索", "ai", "问答"]),
    ("midjourney.com", "AI工具", &["图像", "生成", "ai绘画"]),
    ("stable-diffusion-ui.com", "AI工具", &["stable diffusion", "ai绘画"]),
    ("huggingface.co", "AI工具", &["模型", "ai", "机器学习"]),
    ("kaggle.com", "AI工具", &["数据科学", "机器学习", "竞赛"]),
    ("colab.research.google.com", "AI工具", &["jupyter", "python", "机器学习"]),
    // Social
    ("twitter.com", "社交媒体", &["推特", "社交", "tweet"]),
    ("x.com", "社交媒体", &["推特", "X", "社交"]),
    ("facebook.com", "社交媒体", &["脸书", "社交", "fb"]),
    ("instagram.com", "社交媒体", &["照片", "社交", "ins"]),
    ("linkedin.com", "社交媒体", &["领英", "职业", "社交"]),
    ("reddit.com", "社交媒体", &["论坛", "讨论", "社区"]),
    ("discord.com", "社交媒体", &["聊天", "游戏", "社区"]),
    ("telegram.org", "社交媒体", &["电报", "聊天", "即时通讯"]),
    ("weibo.com", "社交媒体", &["微博", "社交", "中文"]),
    ("zhihu.com", "社交媒体", &["知乎", "问答", "知识"]),
    ("douban.com", "社交媒体", &["豆瓣", "评分", "社区"]),
    // Video
    ("youtube.com", "视频娱乐", &["视频", "教程", "youtube"]),
    ("bilibili.com", "视频娱乐", &["B站", "视频", "番剧"]),
    ("netflix.com", "视频娱乐", &["奈飞", "电影", "剧集"]),
    ("twitch.tv", "视频娱乐", &["直播", "游戏", "主播"]),
    ("douyu.com", "视频娱乐", &["斗鱼", "直播", "游戏"]),
    ("huya.com", "视频娱乐", &["虎牙", "直播", "游戏"]),
    ("iqiyi.com", "视频娱乐", &["爱奇艺", "视频", "电影"]),
    ("youku.com", "视频娱乐", &["优酷", "视频", "电影"]),
    ("v.qq.com", "视频娱乐", &["腾讯视频", "视频", "电影"]),
    // News
    ("cnn.com", "新闻资讯", &["新闻", "国际", "CNN"]),
    ("bbc.com", "新闻资讯", &["新闻", "BBC", "国际"]),
    ("reuters.com", "新闻资讯", &["路透社", "新闻", "国际"]),
    ("bloomberg.com", "新闻资讯", &["彭博", "财经", "新闻"]),
    ("wsj.com", "新闻资讯", &["华尔街日报", "财经", "新闻"]),
    ("36kr.com", "新闻资讯", &["36氪", "科技", "创业"]),
    ("ithome.com", "新闻资讯", &["IT之家", "科技", "数码"]),
    ("sina.com.cn", "新闻资讯", &["新浪", "新闻", "门户"]),
    ("qq.com", "新闻资讯", &["腾讯", "新闻", "门户"]),
    ("163.com", "新闻资讯", &["网易", "新闻", "门户"]),
    // Shopping
    ("amazon.com", "购物", &["亚马逊", "电商", "购物"]),
    ("amazon.cn", "购物", &["亚马逊", "电商", "购物"]),
    ("taobao.com", "购物", &["淘宝", "购物", "电商"]),
    ("tmall.com", "购物", &["天猫", "购物", "品牌"]),
    ("jd.com", "购物", &["京东", "购物", "电商"]),
    ("pinduoduo.com", "购物", &["拼多多", "团购", "购物"]),
    ("ebay.com", "购物", &["易贝", "拍卖", "购物"]),
    ("shopee.com", "购物", &["虾皮", "购物", "东南亚"]),
    // Learning
    ("coursera.org", "学习教育", &["课程", "在线教育", "MOOC"]),
    ("udemy.com", "学习教育", &["课程", "教程", "在线学习"]),
    ("edx.org", "学习教育", &["课程", "MOOC", "大学"]),
    ("khanacademy.org", "学习教育", &["可汗学院", "教育", "免费"]),
    ("udacity.com", "学习教育", &["优达学城", "编程", "教育"]),
    ("pluralsight.com", "学习教育", &["技术培训", "编程", "教程"]),
    ("leetcode.com", "学习教育", &["力扣", "算法", "编程"]),
    ("leetcode-cn.com", "学习教育", &["力扣", "算法", "编程"]),
    ("hackerrank.com", "学习教育", &["编程", "算法", "面试"]),
    // Productivity
    ("notion.so", "效率工具", &["笔记", "协作", "知识管理"]),
    ("notion.site", "效率工具", &["notion", "页面", "分享"]),
    ("obsidian.md", "效率工具", &["笔记", "markdown", "知识库"]),
    ("trello.com", "效率工具", &["看板", "项目管理", "协作"]),
    ("asana.com", "效率工具", &["项目管理", "任务", "协作"]),
    ("todoist.com", "效率工具", &["待办", "任务", "GTD"]),
    ("evernote.com", "效率工具", &["印象笔记", "笔记", "同步"]),
    ("onenote.com", "效率工具", &["OneNote", "笔记", "微软"]),
    ("dropbox.com", "效率工具", &["云存储", "同步", "文件"]),
    ("drive.google.com", "效率工具", &["谷歌云盘", "存储", "协作"]),
    // Design
    ("figma.com", "设计工具", &["设计", "UI", "协作"]),
    ("sketch.com", "设计工具", &["设计", "UI", "Mac"]),
    ("canva.com", "设计工具", &["设计", "模板", "图片"]),
    ("dribbble.com", "设计工具", &["设计", "作品", "灵感"]),
    ("behance.net", "设计工具", &["设计", "作品集", "Adobe"]),
    ("unsplash.com", "设计工具", &["图片", "免费", "高清"]),
    ("pexels.com", "设计工具", &["图片", "免费", "素材"]),
    // Search
    ("google.com", "搜索引擎", &["搜索", "谷歌", "Google"]),
    ("baidu.com", "搜索引擎", &["搜索", "百度", "中文"]),
    ("bing.com", "搜索引擎", &["搜索", "必应", "微软"]),
    ("duckduckgo.com", "搜索引擎", &["搜索", "隐私", "DuckDuckGo"]),
    // Reference docs
    ("developer.mozilla.org", "技术文档", &["MDN", "文档", "Web"]),
    ("w3schools.com", "技术文档", &["教程", "Web", "HTML"]),
    ("devdocs.io", "技术文档", &["文档", "API", "开发"]),
    ("docs.microsoft.com", "技术文档", &["微软", "文档", ".NET"]),
    ("docs.python.org", "技术文档", &["Python", "文档", "官方"]),
    ("nodejs.org", "技术文档", &["Node.js", "JavaScript", "文档"]),
    ("reactjs.org", "技术文档", &["React", "前端", "文档"]),
    ("vuejs.org", "技术文档", &["Vue", "前端", "文档"]),
    // Games
    ("steam.com", "游戏平台", &["Steam", "游戏", "PC"]),
    ("epicgames.com", "游戏平台", &["Epic", "游戏", "商店"]),
    ("playstation.com", "游戏平台", &["PS", "索尼", "游戏"]),
    ("xbox.com", "游戏平台", &["Xbox", "微软", "游戏"]),
    ("nintendo.com", "游戏平台", &["任天堂", "Switch", "游戏"]),
];

static BY_DOMAIN: Lazy<HashMap<&'static str, (&'static str, &'static [&'static str])>> =
    Lazy::new(|| {
        DOMAIN_PATTERNS
            .iter()
            .map(|(domain, category, keywords)| (*domain, (*category, *keywords)))
            .collect()
    });

/// A dictionary hit for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainMatch {
    pub domain: &'static str,
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub confidence: f64,
}

/// Lower-cased hostname of `url` with a leading `www.` removed.
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Looks `url` up by hostname. Exact hits win; among parent-domain hits the
/// longest (most specific) domain wins.
pub fn lookup(url: &str) -> Option<DomainMatch> {
    let host = hostname(url)?;

    if let Some((domain, (category, keywords))) = BY_DOMAIN.get_key_value(host.as_str()) {
        return Some(DomainMatch {
            domain,
            category,
            keywords,
            confidence: EXACT_CONFIDENCE,
        });
    }

    DOMAIN_PATTERNS
        .iter()
        .filter(|(domain, _, _)| {
            host.len() > domain.len()
                && host.ends_with(domain)
                && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
        })
        .max_by_key(|(domain, _, _)| domain.len())
        .map(|(domain, category, keywords)| DomainMatch {
            domain,
            category,
            keywords,
            confidence: SUFFIX_CONFIDENCE,
        })
}

/// Every category the dictionary can produce, sorted and de-duplicated.
pub fn all_categories() -> Vec<&'static str> {
    DOMAIN_PATTERNS
        .iter()
        .map(|(_, category, _)| *category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
