//! OpenCV Haar cascade XML import
//!
//! Reads both the `opencv-cascade-classifier` layout written by
//! `opencv_traincascade` (e.g. `haarcascade_frontalface_default.xml`) and the
//! older `opencv-haar-classifier` layout. Only upright features on
//! single-split weak classifiers are supported.

use std::fmt::Display;
use std::str::FromStr;

use roxmltree::{Document, Node};

use crate::detector::{CascadeStage, HaarCascade, HaarFeature, WeakClassifier, WeightedRect};
use crate::DmsError;

pub(crate) fn parse(xml: &str) -> Result<HaarCascade, DmsError> {
    let doc = Document::parse(xml).map_err(|e| load_error(format!("invalid XML: {e}")))?;
    let cascade = items(doc.root_element())
        .next()
        .ok_or_else(|| load_error("empty cascade document"))?;

    match cascade.attribute("type_id") {
        Some("opencv-cascade-classifier") => parse_current(cascade),
        Some("opencv-haar-classifier") => parse_legacy(cascade),
        other => Err(load_error(format!("unsupported cascade type {other:?}"))),
    }
}

fn parse_current(cascade: Node) -> Result<HaarCascade, DmsError> {
    if let Some(kind) = child_text(cascade, "featureType") {
        if kind != "HAAR" {
            return Err(load_error(format!("unsupported feature type {kind}")));
        }
    }

    let stages = items(required_child(cascade, "stages")?)
        .map(|stage| -> Result<CascadeStage, DmsError> {
            let weak_classifiers = items(required_child(stage, "weakClassifiers")?)
                .map(parse_stump)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CascadeStage {
                threshold: number(required_text(stage, "stageThreshold")?)?,
                weak_classifiers,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let features = items(required_child(cascade, "features")?)
        .map(parse_feature)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HaarCascade {
        window_width: number(required_text(cascade, "width")?)?,
        window_height: number(required_text(cascade, "height")?)?,
        stages,
        features,
    })
}

/// `internalNodes` is `left right feature threshold`, `leafValues` is `below above`
fn parse_stump(node: Node) -> Result<WeakClassifier, DmsError> {
    let internal: Vec<&str> = required_text(node, "internalNodes")?.split_whitespace().collect();
    let leaves: Vec<&str> = required_text(node, "leafValues")?.split_whitespace().collect();
    let ([_, _, feature, threshold], [left, right]) = (internal.as_slice(), leaves.as_slice()) else {
        return Err(load_error("only single-split weak classifiers are supported"));
    };

    Ok(WeakClassifier {
        feature: number(feature)?,
        threshold: number(threshold)?,
        left: number(left)?,
        right: number(right)?,
    })
}

// Legacy files inline each feature in its tree node.
fn parse_legacy(cascade: Node) -> Result<HaarCascade, DmsError> {
    let size: Vec<&str> = required_text(cascade, "size")?.split_whitespace().collect();
    let [width, height] = size.as_slice() else {
        return Err(load_error("malformed <size>"));
    };

    let mut features = Vec::new();
    let mut stages = Vec::new();
    for stage in items(required_child(cascade, "stages")?) {
        let mut weak_classifiers = Vec::new();
        for tree in items(required_child(stage, "trees")?) {
            let mut nodes = items(tree);
            let (Some(node), None) = (nodes.next(), nodes.next()) else {
                return Err(load_error("only single-node trees are supported"));
            };
            features.push(parse_feature(required_child(node, "feature")?)?);
            weak_classifiers.push(WeakClassifier {
                feature: features.len() - 1,
                threshold: number(required_text(node, "threshold")?)?,
                left: number(required_text(node, "left_val")?)?,
                right: number(required_text(node, "right_val")?)?,
            });
        }
        stages.push(CascadeStage {
            threshold: number(required_text(stage, "stage_threshold")?)?,
            weak_classifiers,
        });
    }

    Ok(HaarCascade {
        window_width: number(width)?,
        window_height: number(height)?,
        stages,
        features,
    })
}

fn parse_feature(node: Node) -> Result<HaarFeature, DmsError> {
    if child_text(node, "tilted").is_some_and(|tilted| tilted != "0") {
        return Err(load_error("tilted features are not supported"));
    }

    let rects = items(required_child(node, "rects")?)
        .map(|rect| parse_rect(rect.text().unwrap_or_default()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HaarFeature { rects })
}

/// `x y width height weight`
fn parse_rect(text: &str) -> Result<WeightedRect, DmsError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    let [x, y, width, height, weight] = fields.as_slice() else {
        return Err(load_error(format!("malformed rectangle '{}'", text.trim())));
    };

    Ok(WeightedRect {
        x: number(x)?,
        y: number(y)?,
        width: number(width)?,
        height: number(height)?,
        weight: number(weight)?,
    })
}

fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn required_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, DmsError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| load_error(format!("missing <{name}>")))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

fn required_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, DmsError> {
    child_text(node, name).ok_or_else(|| load_error(format!("missing <{name}>")))
}

fn number<T>(text: &str) -> Result<T, DmsError>
where
    T: FromStr,
    T::Err: Display,
{
    text.trim()
        .parse()
        .map_err(|e| load_error(format!("bad number '{}': {e}", text.trim())))
}

fn load_error(message: impl Into<String>) -> DmsError {
    DmsError::CascadeLoad(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>2</maxWeakCount>
      <stageThreshold>-1.2500000000000000e+00</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 -3.1511999666690826e-02</internalNodes>
          <leafValues>
            2.0875380039215088e+00 -2.2172100543975830e+00</leafValues></_>
        <_>
          <internalNodes>
            0 -1 1 1.2396000325679779e-02</internalNodes>
          <leafValues>
            -1.8633940219879150e+00 1.3272049427032471e+00</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          6 4 12 9 -1.</_>
        <_>
          6 7 12 3 3.</_></rects></_>
    <_>
      <rects>
        <_>
          6 4 12 7 -1.</_>
        <_>
          10 4 4 7 3.</_></rects>
      <tilted>0</tilted></_></features></cascade>
</opencv_storage>
"#;

    const LEGACY: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<haarcascade_eye type_id="opencv-haar-classifier">
  <size>20 20</size>
  <stages>
    <_>
      <trees>
        <_>
          <_>
            <feature>
              <rects>
                <_>0 8 20 12 -1.</_>
                <_>0 14 20 6 2.</_></rects>
              <tilted>0</tilted></feature>
            <threshold>0.1296026855707169</threshold>
            <left_val>-0.7730420827865601</left_val>
            <right_val>0.6835014820098877</right_val></_></_></trees>
      <stage_threshold>-1.4284169673919678</stage_threshold>
      <parent>-1</parent>
      <next>-1</next></_></stages></haarcascade_eye>
</opencv_storage>
"#;

    #[test]
    fn test_parse_traincascade_layout() {
        let cascade = parse(CURRENT).unwrap();

        assert_eq!((cascade.window_width, cascade.window_height), (24, 24));
        assert_eq!(cascade.stages.len(), 1);
        assert_eq!(cascade.stages[0].threshold, -1.25);

        let weak = &cascade.stages[0].weak_classifiers;
        assert_eq!(weak.len(), 2);
        assert_eq!(weak[1].feature, 1);
        assert!((weak[0].threshold + 0.031512).abs() < 1e-6);
        assert!((weak[0].left - 2.087538).abs() < 1e-6);
        assert!((weak[0].right + 2.21721).abs() < 1e-6);

        assert_eq!(cascade.features.len(), 2);
        let rect = &cascade.features[0].rects[1];
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (6, 7, 12, 3));
        assert_eq!(rect.weight, 3.0);
    }

    #[test]
    fn test_parse_legacy_layout() {
        let cascade = parse(LEGACY).unwrap();

        assert_eq!((cascade.window_width, cascade.window_height), (20, 20));
        assert_eq!(cascade.features.len(), 1);
        assert_eq!(cascade.features[0].rects[0].weight, -1.0);
        let stage = &cascade.stages[0];
        assert!((stage.threshold + 1.428417).abs() < 1e-6);
        assert_eq!(stage.weak_classifiers[0].feature, 0);
        assert!((stage.weak_classifiers[0].right - 0.683501).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_tilted_features() {
        let xml = CURRENT.replace("<tilted>0</tilted>", "<tilted>1</tilted>");
        assert!(matches!(parse(&xml), Err(DmsError::CascadeLoad(msg)) if msg.contains("tilted")));
    }

    #[test]
    fn test_rejects_deeper_trees() {
        let xml = CURRENT.replace("0 -1 1 1.2396000325679779e-02", "1 -1 1 1.2e-02 0 -2 0 0.5");
        assert!(matches!(parse(&xml), Err(DmsError::CascadeLoad(msg)) if msg.contains("single-split")));
    }

    #[test]
    fn test_rejects_other_documents() {
        assert!(parse("<opencv_storage><model type_id=\"opencv-ml-svm\"/></opencv_storage>").is_err());
        assert!(parse("not xml").is_err());
        let lbp = CURRENT.replace("<featureType>HAAR</featureType>", "<featureType>LBP</featureType>");
        assert!(parse(&lbp).is_err());
    }
}
