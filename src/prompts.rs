//! System prompts, user-prompt builders, and JSON output templates.

use crate::models::IngredientItem;

pub const SYSTEM_PROMPT_BASE: &str = "\
你是专业中餐研发主厨与家庭烹饪教学专家。

输出风格必须综合：
1) 菜谱库风格的硬核严谨：食材克重/毫升、火候、时间、顺序精确。
2) 网络流行菜谱的调味与口感技巧：可执行、家常、稳定成功率。

规则：
- 只输出 JSON，不输出 markdown，不输出额外解释。
- 必须使用中文。
- 所有可量化信息尽量量化（g/ml/min/温度区间）。
- 食材名称尽量使用常见中文名称。
- 不要虚构用户已有食材，缺失项必须能明确列出。
- 如果提供了“参考片段”，优先参考其做法与配比，再结合常见调味技巧做合理补充。";

pub const SYSTEM_PROMPT_RECOMMEND: &str = "\
任务：根据用户已有食材，按难度分级推荐菜品。
要求：
- 输出 recommendations 数组，按 easy / medium / hard 三个难度组织内容。
- 每个难度最多 3 道；若某个难度确实无合适菜可不返回该难度。
- 每道菜给出推荐理由、主要所需食材、预计时间、难度。
- 难度仅允许 easy / medium / hard。
- ID 建议使用 dish_easy_1 / dish_medium_1 / dish_hard_1 这类可读格式。
- 若参考片段中有高度匹配的菜名/做法，优先推荐该方向。
- 每条 reason 控制在 30 个汉字内。
- 每道菜 requiredIngredients 最多 6 项。";

pub const SYSTEM_PROMPT_RECIPE: &str = "\
任务：生成结构化菜谱详情，并给出缺失采购清单。
要求：
- 先提供“所需总食材 requiredIngredients”。
- 再提供“missingIngredients”（基于用户已有食材推断）。
- 步骤最多 8 步，每步都必须有 keyPoint。
- keyPoint 必须是可执行关键点（火候、时长、状态判断、常见失误规避）。
- 若参考片段中存在同名或高度相关菜谱，步骤顺序和关键火候需与参考保持一致或给出合理解释。";

pub const SYSTEM_PROMPT_INGREDIENT_EXTRACT: &str = "\
任务：从用户口语化输入中提取食材清单。
要求：
- 只提取真实食材名称，忽略寒暄、数量词与无关内容。
- 食材使用常见中文名称，每项一个词。
- 最多 20 项；没有可提取食材时返回空数组。";

pub const SYSTEM_PROMPT_RECIPE_FILL: &str = "\
任务：为给定菜品补全步骤、技巧与用时。
要求：
- 只使用给定食材与常见调味料，不得引入无关食材。
- 步骤最多 8 步，按操作顺序编号。
- timing 的 totalMin 必须大于 0。";

/// Extra instructions appended when no local grounding was found and the
/// provider's web search tool is in play.
pub const WEB_SEARCH_ADDENDUM: &str = "\
附加要求：
- 当前未命中本地菜谱库，请使用联网检索补充权威做法。
- 优先检索中文菜谱站点或高质量内容来源，最多引用 3 条。
- 返回 sourceType=\"web\"，并填写 webReferences（title/url/snippet）。
- 每步 sourceTag 设为 \"web\"。";

pub const RECOMMEND_TEMPLATE: &str = r#"{
  "recommendations": [
    {
      "id": "dish_easy_1",
      "name": "菜名",
      "reason": "推荐理由",
      "requiredIngredients": [{ "name": "食材", "amount": "100g" }],
      "estimatedTimeMin": 15,
      "difficulty": "easy",
      "recipePreview": {
        "servings": "2人份",
        "steps": [{ "stepNo": 1, "instruction": "步骤描述", "keyPoint": "关键点" }],
        "tips": ["技巧1"],
        "timing": { "prepMin": 8, "cookMin": 7, "totalMin": 15 }
      }
    },
    {
      "id": "dish_medium_1",
      "name": "菜名",
      "reason": "推荐理由",
      "requiredIngredients": [{ "name": "食材", "amount": "100g" }],
      "estimatedTimeMin": 20,
      "difficulty": "medium"
    },
    {
      "id": "dish_hard_1",
      "name": "菜名",
      "reason": "推荐理由",
      "requiredIngredients": [{ "name": "食材", "amount": "100g" }],
      "estimatedTimeMin": 25,
      "difficulty": "hard"
    }
  ]
}"#;

/// Smaller variant used on the retry path: no embedded preview, fewer output
/// tokens, better odds under tight model budgets.
pub const RECOMMEND_TEMPLATE_LITE: &str = r#"{
  "recommendations": [
    {
      "id": "dish_easy_1",
      "name": "菜名",
      "reason": "推荐理由",
      "requiredIngredients": [{ "name": "食材", "amount": "100g" }],
      "estimatedTimeMin": 15,
      "difficulty": "easy"
    }
  ]
}"#;

pub const RECIPE_TEMPLATE: &str = r#"{
  "dishName": "番茄炒蛋",
  "servings": "2人份",
  "requiredIngredients": [{ "name": "西红柿", "amount": "300g" }],
  "missingIngredients": [{ "name": "盐", "amount": "2g" }],
  "steps": [
    { "stepNo": 1, "instruction": "步骤描述", "keyPoint": "关键点", "sourceTag": "model" }
  ],
  "tips": ["技巧1"],
  "sourceType": "model",
  "webReferences": [{ "title": "来源标题", "url": "https://example.com", "snippet": "摘要" }],
  "timing": { "prepMin": 8, "cookMin": 7, "totalMin": 15 }
}"#;

pub const EXTRACT_TEMPLATE: &str = r#"{
  "ingredients": ["土豆", "牛肉", "西红柿"]
}"#;

pub const FILL_TEMPLATE: &str = r#"{
  "steps": [
    { "stepNo": 1, "instruction": "步骤描述", "keyPoint": "关键点（可选）" }
  ],
  "tips": ["技巧1"],
  "timing": { "prepMin": 8, "cookMin": 10, "totalMin": 18 }
}"#;

pub fn build_recommend_user_prompt(input_text: &str, owned_ingredients: &[String]) -> String {
    format!(
        "用户输入：{}\n用户已有食材：{}\n请严格按目标 JSON 结构输出。",
        input_text,
        owned_ingredients.join("、")
    )
}

pub fn build_recipe_user_prompt(dish_name: &str, owned_ingredients: &[String]) -> String {
    format!(
        "目标菜品：{}\n用户已有食材：{}\n请严格按目标 JSON 结构输出。",
        dish_name,
        owned_ingredients.join("、")
    )
}

pub fn build_extract_user_prompt(input_text: &str, raw_candidates: &[String]) -> String {
    format!(
        "用户原始输入：{}\n初步候选食材：{}\n请输出清洗后的食材数组。",
        input_text,
        raw_candidates.join("、")
    )
}

pub fn build_fill_user_prompt(
    dish_name: &str,
    required_ingredients: &[IngredientItem],
    owned_ingredients: &[String],
) -> String {
    let required: Vec<String> = required_ingredients
        .iter()
        .map(|item| format!("{}({})", item.name, item.amount))
        .collect();
    format!(
        "菜品：{}\n所需食材：{}\n用户已有食材：{}\n请补全 steps / tips / timing。",
        dish_name,
        required.join("、"),
        owned_ingredients.join("、")
    )
}
