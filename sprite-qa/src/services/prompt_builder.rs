//! Base prompt builder
//!
//! Rebuilds the generation prompt pair for a stored artifact. Order:
//! user description, object type, perspective, style, isolation clause.

use serde::Serialize;

/// Style used when a style id is unknown
pub const DEFAULT_STYLE: &str = "PIXEL_ART_16";

const ISOLATION_PROMPT: &str = "single isolated game asset icon, centered, clean background, \
                                professional game art, high quality render";

const NEGATIVE_CORE: &str = "multiple items, collection, many objects, sprite sheet, grid, \
                             duplicates, background, scenery, environment, landscape, room, \
                             blurry, low quality, watermark, text, signature, cropped, cut off, \
                             partial, incomplete";

const NEGATIVE_WEAPONS: &str =
    "scabbard, sheath, holder, stand, hand holding, person wielding, combat scene";

const NEGATIVE_ARMOR: &str =
    "body inside, person wearing, mannequin, human form, skin visible, face inside";

/// Prompt / negative prompt pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub prompt: String,
    pub negative: String,
}

fn perspective(category: &str, subcategory: &str) -> Option<&'static str> {
    let text = match (category, subcategory) {
        ("WEAPONS", "SWORDS") => "side view, horizontal, full blade visible from tip to handle",
        ("WEAPONS", "AXES") => "side view, diagonal angle, full head and handle visible",
        ("WEAPONS", "POLEARMS") => "vertical, full length from tip to bottom",
        ("WEAPONS", "BOWS") => "front view, slight angle, full curve and string visible",
        ("WEAPONS", "STAFFS") => "vertical, full length, top ornament visible",
        ("WEAPONS", "GUNS") => "side profile, horizontal, full weapon visible",
        ("WEAPONS", "THROWING") => "top-down flat view, full shape visible",
        ("ARMOR", "HELMETS") => "front 3/4 view, face opening visible, no head inside",
        ("ARMOR", "CHEST_ARMOR") => "front view, torso piece only, no body inside",
        ("ARMOR", "SHIELDS") => "front view, flat, emblem/design visible",
        ("ARMOR", "GLOVES") => "3/4 view, pair of gloves, no hands inside",
        ("ARMOR", "BOOTS") => "side view, pair of boots, no feet inside",
        ("ARMOR", "ACCESSORIES") => "front view, centered",
        ("CONSUMABLES", "POTIONS") => "front view, slight angle, full bottle visible",
        ("CONSUMABLES", "FOOD") => "3/4 view, appetizing presentation",
        ("CONSUMABLES", "SCROLLS") => "slight angle, rolled parchment visible",
        ("RESOURCES", "GEMS") => "front view, facets visible, sparkling",
        ("RESOURCES", "ORES") => "3/4 view, raw chunk",
        ("RESOURCES", "WOOD_STONE") => "3/4 view, raw material",
        ("RESOURCES", "PLANTS") => "front view, full plant visible",
        ("RESOURCES", "MONSTER_PARTS") => "3/4 view, detailed",
        ("RESOURCES", "MAGIC_MATERIALS") => "front view, glowing",
        ("CHARACTERS", "HEROES") => "front 3/4 view, full body, heroic pose",
        ("CHARACTERS", "ENEMIES") => "front 3/4 view, full body, menacing pose",
        ("CHARACTERS", "NPCS") => "front 3/4 view, full body, neutral pose",
        ("CHARACTERS", "BOSSES") => "front view, full body, imposing stance",
        ("CREATURES", "ANIMALS") => "side 3/4 view, full body",
        ("CREATURES", "MYTHICAL") => "front 3/4 view, full body, majestic",
        ("CREATURES", "PETS") => "front view, full body, cute pose",
        ("CREATURES", "ELEMENTALS") => "front view, full form, energy visible",
        _ => return None,
    };
    Some(text)
}

fn object_type(category: &str, subcategory: &str) -> Option<&'static str> {
    let text = match (category, subcategory) {
        ("WEAPONS", "SWORDS") => "sword, bladed weapon",
        ("WEAPONS", "AXES") => "axe, chopping weapon",
        ("WEAPONS", "POLEARMS") => "polearm, long-shafted weapon",
        ("WEAPONS", "BOWS") => "bow, ranged weapon with string",
        ("WEAPONS", "STAFFS") => "magical staff",
        ("WEAPONS", "GUNS") => "firearm, gun",
        ("WEAPONS", "THROWING") => "throwing weapon",
        ("ARMOR", "HELMETS") => "helmet, head protection, empty inside",
        ("ARMOR", "CHEST_ARMOR") => "chest armor, torso protection, empty inside",
        ("ARMOR", "SHIELDS") => "shield, defensive equipment",
        ("ARMOR", "GLOVES") => "gauntlets, hand armor, empty inside",
        ("ARMOR", "BOOTS") => "boots, foot armor, empty inside",
        ("ARMOR", "ACCESSORIES") => "armor accessory",
        ("CONSUMABLES", "POTIONS") => "potion bottle, glass container with liquid",
        ("CONSUMABLES", "FOOD") => "food item, edible",
        ("CONSUMABLES", "SCROLLS") => "scroll, rolled parchment",
        ("RESOURCES", "GEMS") => "gemstone, precious crystal",
        ("RESOURCES", "ORES") => "ore, raw mineral",
        ("RESOURCES", "WOOD_STONE") => "raw material",
        ("RESOURCES", "PLANTS") => "herb, magical plant",
        ("RESOURCES", "MONSTER_PARTS") => "monster drop, creature part",
        ("RESOURCES", "MAGIC_MATERIALS") => "magical material, enchanted essence",
        ("CHARACTERS", "HEROES") => "hero character, adventurer",
        ("CHARACTERS", "ENEMIES") => "enemy character, hostile",
        ("CHARACTERS", "NPCS") => "NPC, friendly character",
        ("CHARACTERS", "BOSSES") => "boss enemy, powerful foe",
        ("CREATURES", "ANIMALS") => "animal, creature",
        ("CREATURES", "MYTHICAL") => "mythical beast, legendary creature",
        ("CREATURES", "PETS") => "pet companion, cute creature",
        ("CREATURES", "ELEMENTALS") => "elemental being, magical entity",
        _ => return None,
    };
    Some(text)
}

fn style_prompt(style: &str) -> Option<&'static str> {
    let text = match style {
        "PIXEL_ART_16" => "16-bit pixel art, retro SNES style, visible pixels, limited palette",
        "PIXEL_ART_32" => "32-bit HD pixel art, detailed pixels, indie game style",
        "HAND_PAINTED" => "hand-painted digital art, painterly brushstrokes",
        "VECTOR_CLEAN" => "clean vector art, flat colors, smooth edges, mobile game style",
        "ANIME_GAME" => "anime game art, cel shading, JRPG style",
        "CHIBI_CUTE" => "chibi kawaii style, cute big head, adorable",
        "CARTOON_WESTERN" => "western cartoon, bold outlines, Cuphead style",
        "DARK_SOULS" => "dark fantasy, gritty, weathered, souls-like",
        "ISOMETRIC" => "isometric 2.5D, 30 degree angle, strategy game style",
        "ISOMETRIC_PIXEL" => "isometric pixel art, retro RTS style",
        "ISOMETRIC_CARTOON" => "isometric cartoon, colorful casual game",
        "REALISTIC_PAINTED" => "realistic digital painting, detailed, concept art quality",
        _ => return None,
    };
    Some(text)
}

fn style_negative(style: &str) -> Option<&'static str> {
    let text = match style {
        "PIXEL_ART_16" => "smooth gradients, anti-aliasing, realistic, 3D render, photograph",
        "PIXEL_ART_32" => "smooth gradients, anti-aliasing, realistic, soft edges",
        "HAND_PAINTED" => "pixel art, vector, flat colors, 3D render",
        "VECTOR_CLEAN" => "textured, painterly, pixel art, realistic",
        "ANIME_GAME" => "western cartoon, realistic, pixel art",
        "CHIBI_CUTE" => "realistic proportions, dark, scary, detailed",
        "CARTOON_WESTERN" => "anime, realistic, pixel art, thin lines",
        "DARK_SOULS" => "bright colors, cartoon, cute, chibi, colorful",
        "ISOMETRIC" => "perspective view, top-down, side view, realistic 3D",
        "ISOMETRIC_PIXEL" => "smooth gradients, perspective, realistic",
        "ISOMETRIC_CARTOON" => "realistic, dark, pixel art, perspective",
        "REALISTIC_PAINTED" => "cartoon, pixel art, flat colors, anime",
        _ => return None,
    };
    Some(text)
}

/// Build the base prompt pair for a request
///
/// Unknown styles render with the default style prompt but add no style
/// negative.
pub fn build_prompt(user_prompt: &str, category: &str, subcategory: &str, style: &str) -> PromptPair {
    let mut parts: Vec<&str> = Vec::with_capacity(5);

    let clean = user_prompt.trim();
    if !clean.is_empty() {
        parts.push(clean);
    }
    if let Some(object) = object_type(category, subcategory) {
        parts.push(object);
    }
    if let Some(view) = perspective(category, subcategory) {
        parts.push(view);
    }
    parts.push(style_prompt(style).or_else(|| style_prompt(DEFAULT_STYLE)).unwrap_or_default());
    parts.push(ISOLATION_PROMPT);

    let mut negative: Vec<&str> = vec![NEGATIVE_CORE];
    match category {
        "WEAPONS" => negative.push(NEGATIVE_WEAPONS),
        "ARMOR" => negative.push(NEGATIVE_ARMOR),
        _ => {}
    }
    if let Some(style_neg) = style_negative(style) {
        negative.push(style_neg);
    }

    PromptPair {
        prompt: parts.join(", "),
        negative: negative.join(", "),
    }
}
