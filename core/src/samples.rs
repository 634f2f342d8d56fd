//! Recipes bundled with the application. Shown when no backend is configured
//! and used to seed an empty remote catalog.

use crate::models::{Category, Difficulty, Ingredient, Recipe};

fn ing(id: &str, name: &str, amount: f64, unit: &str, category: Category) -> Ingredient {
    Ingredient {
        id: id.to_string(),
        name: name.to_string(),
        amount,
        unit: unit.to_string(),
        category,
    }
}

fn lines(steps: &[&str]) -> Vec<String> {
    steps.iter().map(|s| (*s).to_string()).collect()
}

#[must_use]
pub fn sample_recipes() -> Vec<Recipe> {
    vec![
        Recipe {
            id: "sample-1".to_string(),
            name: "Grilled Salmon with Roasted Vegetables".to_string(),
            description: "Fresh salmon fillet with seasonal roasted vegetables and herbs"
                .to_string(),
            image: String::new(),
            cook_time: 25,
            servings: 2,
            difficulty: Difficulty::Medium,
            ingredients: vec![
                ing("s1-1", "Salmon fillet", 2.0, "pieces", Category::Protein),
                ing("s1-2", "Broccoli", 200.0, "g", Category::Vegetable),
                ing("s1-3", "Bell peppers", 1.0, "piece", Category::Vegetable),
                ing("s1-4", "Olive oil", 2.0, "tbsp", Category::Other),
                ing("s1-5", "Lemon", 1.0, "piece", Category::Other),
                ing("s1-6", "Garlic", 2.0, "cloves", Category::Spice),
                ing("s1-7", "Fresh herbs", 1.0, "bunch", Category::Spice),
            ],
            instructions: lines(&[
                "Preheat oven to 200°C",
                "Season salmon with salt, pepper and herbs",
                "Cut vegetables into chunks and toss with olive oil",
                "Roast vegetables for 15 minutes",
                "Grill salmon for 4-5 minutes each side",
                "Serve with lemon wedges",
            ]),
            tags: lines(&["healthy", "protein", "quick", "gluten-free"]),
        },
        Recipe {
            id: "sample-2".to_string(),
            name: "Pasta Primavera".to_string(),
            description: "Creamy pasta with fresh seasonal vegetables and parmesan".to_string(),
            image: String::new(),
            cook_time: 20,
            servings: 4,
            difficulty: Difficulty::Easy,
            ingredients: vec![
                ing("s2-1", "Pasta", 400.0, "g", Category::Grain),
                ing("s2-2", "Heavy cream", 200.0, "ml", Category::Dairy),
                ing("s2-3", "Parmesan cheese", 100.0, "g", Category::Dairy),
                ing("s2-4", "Zucchini", 1.0, "piece", Category::Vegetable),
                ing("s2-5", "Cherry tomatoes", 200.0, "g", Category::Vegetable),
                ing("s2-6", "Asparagus", 150.0, "g", Category::Vegetable),
                ing("s2-7", "Garlic", 3.0, "cloves", Category::Spice),
            ],
            instructions: lines(&[
                "Cook pasta according to package instructions",
                "Sauté garlic in olive oil until fragrant",
                "Add vegetables and cook until tender",
                "Pour in cream and simmer",
                "Add cooked pasta and toss with cheese",
                "Season with salt, pepper and fresh herbs",
            ]),
            tags: lines(&["vegetarian", "comfort-food", "easy", "family-friendly"]),
        },
        Recipe {
            id: "sample-3".to_string(),
            name: "Chicken Stir-Fry".to_string(),
            description: "Healthy chicken stir-fry with colorful vegetables and ginger"
                .to_string(),
            image: String::new(),
            cook_time: 15,
            servings: 3,
            difficulty: Difficulty::Easy,
            ingredients: vec![
                ing("s3-1", "Chicken breast", 400.0, "g", Category::Protein),
                ing("s3-2", "Soy sauce", 3.0, "tbsp", Category::Other),
                ing("s3-3", "Ginger", 2.0, "cm", Category::Spice),
                ing("s3-4", "Bell peppers", 2.0, "pieces", Category::Vegetable),
                ing("s3-5", "Snap peas", 150.0, "g", Category::Vegetable),
                ing("s3-6", "Carrots", 1.0, "piece", Category::Vegetable),
                ing("s3-7", "Sesame oil", 1.0, "tbsp", Category::Other),
            ],
            instructions: lines(&[
                "Cut chicken into bite-sized pieces",
                "Heat oil in a wok or large pan",
                "Stir-fry chicken until golden",
                "Add vegetables and stir-fry for 3-4 minutes",
                "Add soy sauce and ginger",
                "Serve immediately over rice",
            ]),
            tags: lines(&["healthy", "quick", "protein", "asian", "low-carb"]),
        },
    ]
}

#[must_use]
pub fn find_sample(id: &str) -> Option<Recipe> {
    sample_recipes().into_iter().find(|r| r.id == id)
}
