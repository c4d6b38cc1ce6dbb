use std::collections::BTreeMap;

use sqlx::PgPool;

use crate::error::AppResult;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";

/// One ingredient row of one recipe in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

pub async fn cart_lines(db: &PgPool, user_id: i64) -> AppResult<Vec<CartLine>> {
    let lines = sqlx::query_as::<_, CartLine>(
        r#"
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_carts sc
        JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(lines)
}

/// Sums amounts per (name, unit), ordered by name.
pub fn aggregate(lines: impl IntoIterator<Item = CartLine>) -> Vec<ShoppingItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for line in lines {
        *totals
            .entry((line.name, line.measurement_unit))
            .or_default() += i64::from(line.amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), total)| ShoppingItem {
            name,
            measurement_unit,
            total,
        })
        .collect()
}

pub fn render(items: &[ShoppingItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} — {} {}", item.name, item.total, item.measurement_unit))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, unit: &str, amount: i32) -> CartLine {
        CartLine {
            name: name.into(),
            measurement_unit: unit.into(),
            amount,
        }
    }

    #[test]
    fn same_ingredient_across_recipes_is_summed() {
        let items = aggregate([line("ingredientX", "g", 200), line("ingredientX", "g", 100)]);
        assert_eq!(render(&items), "ingredientX — 300 g");
    }

    #[test]
    fn different_units_stay_separate() {
        let items = aggregate([
            line("sugar", "g", 5),
            line("flour", "g", 100),
            line("sugar", "tbsp", 1),
            line("sugar", "g", 10),
        ]);
        assert_eq!(render(&items), "flour — 100 g\nsugar — 15 g\nsugar — 1 tbsp");
    }

    #[test]
    fn empty_cart_renders_empty_file() {
        assert_eq!(render(&aggregate(Vec::new())), "");
    }
}
