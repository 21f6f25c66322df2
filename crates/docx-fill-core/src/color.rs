//! Forcing a uniform text colour on generated documents.

use crate::traverse::{for_each_run, W_RPR};
use crate::xml::{XmlElement, XmlNode};

const W_COLOR: &str = "w:color";

/// `w:rPr` children that must come after `w:color` (CT_RPr sequence order).
const AFTER_COLOR: &[&str] = &[
    "w:spacing",
    "w:w",
    "w:kern",
    "w:position",
    "w:sz",
    "w:szCs",
    "w:highlight",
    "w:u",
    "w:effect",
    "w:bdr",
    "w:shd",
    "w:fitText",
    "w:vertAlign",
    "w:rtl",
    "w:cs",
    "w:em",
    "w:lang",
    "w:eastAsianLayout",
    "w:specVanish",
    "w:oMath",
    "w:rPrChange",
];

const THEME_ATTRS: &[&str] = &["w:themeColor", "w:themeTint", "w:themeShade"];

/// Set the text colour of every run under `root` to `hex` (e.g. `"000000"`).
///
/// Theme colour attributes are removed so the explicit value wins. Returns
/// the number of runs touched.
pub fn force_text_color(root: &mut XmlElement, hex: &str) -> usize {
    let mut count = 0;
    for_each_run(root, &mut |run| {
        set_run_color(run, hex);
        count += 1;
    });
    count
}

fn set_run_color(run: &mut XmlElement, hex: &str) {
    if run.child(W_RPR).is_none() {
        run.children.insert(0, XmlNode::Element(XmlElement::new(W_RPR)));
    }
    let Some(props) = run.child_mut(W_RPR) else {
        return;
    };

    if let Some(color) = props.child_mut(W_COLOR) {
        color.set_attr("w:val", hex);
        for attr in THEME_ATTRS {
            color.remove_attr(attr);
        }
        return;
    }

    let pos = props
        .children
        .iter()
        .position(|node| {
            matches!(node, XmlNode::Element(el) if AFTER_COLOR.contains(&el.name.as_str()))
        })
        .unwrap_or(props.children.len());
    props
        .children
        .insert(pos, XmlNode::Element(XmlElement::new(W_COLOR).with_attr("w:val", hex)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;
    use pretty_assertions::assert_eq;

    fn apply(xml: &str) -> (usize, String) {
        let mut doc = XmlDocument::parse("t", xml).unwrap();
        let n = force_text_color(&mut doc.root, "000000");
        (n, doc.to_xml().unwrap())
    }

    #[test]
    fn test_creates_missing_properties() {
        let (n, xml) = apply("<w:p><w:r><w:t>x</w:t></w:r></w:p>");
        assert_eq!(n, 1);
        assert_eq!(
            xml,
            "<w:p><w:r><w:rPr><w:color w:val=\"000000\"/></w:rPr><w:t>x</w:t></w:r></w:p>"
        );
    }

    #[test]
    fn test_inserts_in_schema_order() {
        let (_, xml) = apply("<w:r><w:rPr><w:b/><w:sz w:val=\"24\"/></w:rPr><w:t>x</w:t></w:r>");
        assert_eq!(
            xml,
            "<w:r><w:rPr><w:b/><w:color w:val=\"000000\"/><w:sz w:val=\"24\"/></w:rPr><w:t>x</w:t></w:r>"
        );
    }

    #[test]
    fn test_overwrites_theme_color() {
        let (_, xml) = apply(concat!(
            "<w:r><w:rPr><w:color w:val=\"FF0000\" w:themeColor=\"accent1\" w:themeShade=\"BF\"/></w:rPr>",
            "<w:t>x</w:t></w:r>"
        ));
        assert_eq!(
            xml,
            "<w:r><w:rPr><w:color w:val=\"000000\"/></w:rPr><w:t>x</w:t></w:r>"
        );
    }

    #[test]
    fn test_counts_runs_in_tables() {
        let (n, _) = apply(concat!(
            "<w:body><w:p><w:r><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p>",
            "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>c</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body>"
        ));
        assert_eq!(n, 3);
    }
}
